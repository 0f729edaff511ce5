//! Supervision of the router child process.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use keel_isolation::{IsolatedApplication, IsolatedProcess, spawn_shared};
use parking_lot::Mutex;
use regex::Regex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::RouterConfig;
use crate::error::{Error, Result};
use crate::event_loop;
use crate::report::{RouterReady, RouterReport};

const CONFIG_FILE: &str = "config.json";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const ROUTER_BINARY: &str = "keel-router";

/// Matches the router's stderr log lines: `<timestamp> <LEVEL> <target>: <message>`.
static LOG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\S+\s+(TRACE|DEBUG|INFO|WARN|ERROR)\s+(.*)$").expect("Invalid regex pattern")
});

/// Lifecycle of a supervised router.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouterState {
    /// Constructed, not yet started.
    Created,

    /// Spawned, waiting for the readiness report.
    Starting,

    /// The router reported readiness.
    Running,

    /// The router reported a failure or exited before reporting.
    Failed,

    /// No report arrived before the startup deadline.
    TimedOut,

    /// Stopped; the supervisor is inert.
    Stopped,
}

impl fmt::Display for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
            Self::Stopped => "stopped",
        })
    }
}

/// Options for creating a [`RouterSupervisor`].
#[derive(Clone, Debug)]
pub struct RouterSupervisorOptions {
    /// Configuration handed to the router.
    pub config: RouterConfig,

    /// Path to the router binary. Looked up in `PATH` when `None`.
    pub router_bin: Option<PathBuf>,

    /// Directory for the configuration document and the node key.
    pub working_dir: PathBuf,

    /// Log filter passed to the router. Defaults to `info`.
    pub log_level: Option<String>,

    /// Deadline for the readiness report. Defaults to 30 seconds.
    pub startup_timeout: Option<Duration>,

    /// Grace period between the termination signal and a kill. Defaults to 10 seconds.
    pub shutdown_timeout: Option<Duration>,
}

/// The router as seen by the isolation layer.
struct RouterApp {
    args: Vec<String>,
    executable: String,
    report_tx: Mutex<Option<oneshot::Sender<RouterReport>>>,
    shutdown_timeout: Duration,
    working_dir: PathBuf,
}

impl IsolatedApplication for RouterApp {
    fn args(&self) -> Vec<String> {
        self.args.clone()
    }

    fn executable(&self) -> &str {
        &self.executable
    }

    fn handle_stderr(&self, line: &str) {
        if let Some(caps) = LOG_REGEX.captures(line) {
            let message = caps.get(2).map_or(line, |m| m.as_str());

            match caps.get(1).map(|m| m.as_str()) {
                Some("ERROR") => error!(target: "keel-router", "{}", message),
                Some("WARN") => warn!(target: "keel-router", "{}", message),
                Some("INFO") => info!(target: "keel-router", "{}", message),
                Some("DEBUG") => debug!(target: "keel-router", "{}", message),
                _ => trace!(target: "keel-router", "{}", message),
            }
        } else {
            warn!(target: "keel-router", "{}", line);
        }
    }

    fn handle_stdout(&self, line: &str) {
        let Some(report) = RouterReport::parse(line) else {
            debug!(target: "keel-router", "stdout: {}", line);
            return;
        };

        match self.report_tx.lock().take() {
            Some(tx) => {
                // Receiver is gone once startup was abandoned
                let _ = tx.send(report);
            }
            None => warn!("ignoring additional router report: {:?}", report),
        }
    }

    fn name(&self) -> &str {
        ROUTER_BINARY
    }

    fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    fn working_dir(&self) -> Option<PathBuf> {
        Some(self.working_dir.clone())
    }
}

#[derive(Debug)]
struct Inner {
    process: Option<IsolatedProcess>,
    ready: Option<RouterReady>,
    startup: Option<JoinHandle<()>>,
    state: RouterState,
}

/// Runs the message router as a supervised child process.
///
/// A supervisor starts at most once. Its outcome is delivered through exactly
/// one of the callbacks passed to [`start`](Self::start).
#[derive(Debug)]
pub struct RouterSupervisor {
    config: RouterConfig,
    inner: Arc<Mutex<Inner>>,
    log_level: String,
    router_bin: PathBuf,
    shutdown_timeout: Duration,
    startup_timeout: Duration,
    working_dir: PathBuf,
}

impl RouterSupervisor {
    /// Creates a supervisor in the [`RouterState::Created`] state.
    ///
    /// # Errors
    ///
    /// Returns an error if the router binary cannot be found or the working
    /// directory cannot be created.
    pub fn new(
        RouterSupervisorOptions {
            config,
            router_bin,
            working_dir,
            log_level,
            startup_timeout,
            shutdown_timeout,
        }: RouterSupervisorOptions,
    ) -> Result<Self> {
        let router_bin = match router_bin {
            Some(path) => path,
            None => which::which(ROUTER_BINARY).map_err(|_| Error::BinaryNotFound)?,
        };

        std::fs::create_dir_all(&working_dir)
            .map_err(|e| Error::Io("failed to create router working directory", e))?;

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                process: None,
                ready: None,
                startup: None,
                state: RouterState::Created,
            })),
            log_level: log_level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            router_bin,
            shutdown_timeout: shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            startup_timeout: startup_timeout.unwrap_or(DEFAULT_STARTUP_TIMEOUT),
            working_dir,
        })
    }

    /// Returns the configuration the router runs with.
    #[must_use]
    pub const fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Returns the websocket URL the router serves.
    ///
    /// Once the router is running this is the URL it reported, which differs
    /// from the configured one when the configured port is 0.
    #[must_use]
    pub fn address(&self) -> String {
        self.inner
            .lock()
            .ready
            .as_ref()
            .map_or_else(|| self.config.url(), |ready| ready.url.clone())
    }

    /// Returns the readiness report while the router is running.
    #[must_use]
    pub fn ready(&self) -> Option<RouterReady> {
        self.inner.lock().ready.clone()
    }

    /// Returns the router's process ID while it is alive.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.inner
            .lock()
            .process
            .as_ref()
            .filter(|process| process.running())
            .map(IsolatedProcess::pid)
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RouterState {
        self.inner.lock().state
    }

    /// Starts the router and returns immediately.
    ///
    /// Exactly one of `on_ready` and `on_error` is invoked, from a runtime
    /// task and never before this call returns. Must be called from within a
    /// tokio runtime.
    pub fn start<R, E>(&self, on_ready: R, on_error: E)
    where
        R: FnOnce(RouterReady) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let mut inner = self.inner.lock();

        if inner.state != RouterState::Created {
            let error = Error::InvalidState(inner.state);
            drop(inner);
            tokio::spawn(async move { on_error(error) });
            return;
        }

        inner.state = RouterState::Starting;
        event_loop::backend();

        let launch = self.launch();
        inner.startup = Some(tokio::spawn(run_startup(
            Arc::clone(&self.inner),
            launch,
            self.startup_timeout,
            on_ready,
            on_error,
        )));
    }

    /// Starts the router and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that would have been passed to `on_error`.
    pub async fn start_async(&self) -> Result<RouterReady> {
        let (tx, rx) = oneshot::channel();
        let error_tx = Arc::new(Mutex::new(Some(tx)));
        let ready_tx = Arc::clone(&error_tx);

        self.start(
            move |ready| {
                if let Some(tx) = ready_tx.lock().take() {
                    let _ = tx.send(Ok(ready));
                }
            },
            move |error| {
                if let Some(tx) = error_tx.lock().take() {
                    let _ = tx.send(Err(error));
                }
            },
        );

        rx.await
            .unwrap_or_else(|_| Err(Error::InvalidState(RouterState::Stopped)))
    }

    /// Stops the router and waits for the process to exit.
    ///
    /// Idempotent, and valid in every state. Stopping while startup is in
    /// flight abandons it without invoking either callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be shut down.
    pub async fn stop(&self) -> Result<()> {
        let (process, startup) = {
            let mut inner = self.inner.lock();
            if inner.state == RouterState::Stopped {
                return Ok(());
            }

            inner.state = RouterState::Stopped;
            inner.ready = None;
            (inner.process.take(), inner.startup.take())
        };

        if let Some(startup) = startup {
            startup.abort();
        }

        if let Some(process) = process {
            process.shutdown().await?;
        }

        info!("router supervisor stopped");
        Ok(())
    }

    fn launch(&self) -> Launch {
        let config_path = self.working_dir.join(CONFIG_FILE);

        let (report_tx, report_rx) = oneshot::channel();
        let app = RouterApp {
            args: vec![
                "--config".to_string(),
                config_path.display().to_string(),
                "--working-dir".to_string(),
                self.working_dir.display().to_string(),
                "--log-level".to_string(),
                self.log_level.clone(),
            ],
            executable: self.router_bin.display().to_string(),
            report_tx: Mutex::new(Some(report_tx)),
            shutdown_timeout: self.shutdown_timeout,
            working_dir: self.working_dir.clone(),
        };

        Launch {
            app,
            config_path,
            document: self.config.document_bytes(),
            report_rx,
        }
    }
}

/// Everything needed to bring up the router child, prepared without I/O.
struct Launch {
    app: RouterApp,
    config_path: PathBuf,
    document: Result<Vec<u8>>,
    report_rx: oneshot::Receiver<RouterReport>,
}

impl Launch {
    async fn spawn(self) -> Result<(IsolatedProcess, oneshot::Receiver<RouterReport>)> {
        tokio::fs::write(&self.config_path, self.document?)
            .await
            .map_err(|e| Error::Io("failed to write router config", e))?;

        // The stdout reader holds the only long-lived handle on the app, so the
        // report sender drops once the child's stdout closes.
        let process = spawn_shared(Arc::new(self.app))?;

        Ok((process, self.report_rx))
    }
}

impl Drop for RouterSupervisor {
    fn drop(&mut self) {
        if let Some(startup) = self.inner.lock().startup.take() {
            startup.abort();
        }
    }
}

async fn run_startup<R, E>(
    inner: Arc<Mutex<Inner>>,
    launch: Launch,
    startup_timeout: Duration,
    on_ready: R,
    on_error: E,
) where
    R: FnOnce(RouterReady) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
{
    let (process, report_rx) = match launch.spawn().await {
        Ok(launched) => launched,
        Err(e) => {
            {
                let mut guard = inner.lock();
                if guard.state != RouterState::Starting {
                    return;
                }
                guard.state = RouterState::Failed;
            }

            error!("failed to launch router: {}", e);
            on_error(e);
            return;
        }
    };

    {
        let mut guard = inner.lock();
        if guard.state != RouterState::Starting {
            // Stopped meanwhile; dropping the handle terminates the child.
            return;
        }

        info!("router spawned (pid {}), awaiting readiness", process.pid());
        guard.process = Some(process);
    }

    await_readiness(inner, report_rx, startup_timeout, on_ready, on_error).await;
}

async fn await_readiness<R, E>(
    inner: Arc<Mutex<Inner>>,
    mut report_rx: oneshot::Receiver<RouterReport>,
    startup_timeout: Duration,
    on_ready: R,
    on_error: E,
) where
    R: FnOnce(RouterReady) + Send + 'static,
    E: FnOnce(Error) + Send + 'static,
{
    let outcome = tokio::time::timeout(startup_timeout, &mut report_rx).await;

    let result = {
        let mut guard = inner.lock();
        if guard.state != RouterState::Starting {
            return;
        }

        let result = match outcome {
            Ok(Ok(RouterReport::Ready(ready))) => Ok(ready),
            Ok(Ok(RouterReport::Failed { error })) => Err(Error::StartupFailure(error)),
            Ok(Err(_)) => Err(Error::StartupFailure(
                "router exited before reporting readiness".to_string(),
            )),
            Err(_) => Err(Error::StartupTimeout(startup_timeout)),
        };

        guard.state = match &result {
            Ok(ready) => {
                guard.ready = Some(ready.clone());
                RouterState::Running
            }
            Err(Error::StartupTimeout(_)) => RouterState::TimedOut,
            Err(_) => RouterState::Failed,
        };

        result
    };

    match result {
        Ok(ready) => {
            info!("router ready at {}", ready.url);
            on_ready(ready);
        }
        Err(Error::StartupTimeout(timeout)) => {
            error!("router did not report readiness within {:?}", timeout);
            on_error(Error::StartupTimeout(timeout));

            if let Ok(report) = report_rx.await {
                warn!("discarding router report after timeout: {:?}", report);
            }
        }
        Err(e) => {
            error!("router failed to start: {}", e);
            on_error(e);
        }
    }
}
