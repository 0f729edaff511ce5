//! Process spawning functionality for isolated applications.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::IsolatedApplication;
use crate::error::{Error, Result};

/// Observed lifecycle of a child process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessExit {
    /// The process has not exited yet.
    Running,

    /// The process exited with the given status.
    Exited(ExitStatus),

    /// The process is gone but its status could not be collected.
    Lost,
}

/// Represents a running isolated process.
///
/// The process is owned exclusively by this handle. Dropping the handle
/// requests the same graceful termination as [`shutdown`](Self::shutdown)
/// without waiting for it.
pub struct IsolatedProcess {
    /// Receives the exit state from the monitor task
    exit_rx: watch::Receiver<ProcessExit>,

    /// Name of the application, for logging
    name: String,

    /// Process ID
    pid: u32,

    /// Shutdown token to request termination
    shutdown_token: CancellationToken,

    /// Task tracker for all tasks associated with this process
    task_tracker: TaskTracker,
}

impl std::fmt::Debug for IsolatedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedProcess")
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("exit", &*self.exit_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl IsolatedProcess {
    /// Returns the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns the current exit state without waiting.
    #[must_use]
    pub fn exit_state(&self) -> ProcessExit {
        *self.exit_rx.borrow()
    }

    /// Whether the process is still running.
    #[must_use]
    pub fn running(&self) -> bool {
        self.exit_state() == ProcessExit::Running
    }

    /// Waits for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the exit status could not be collected.
    pub async fn wait(&self) -> Result<ExitStatus> {
        let mut exit_rx = self.exit_rx.clone();
        let state = exit_rx
            .wait_for(|state| *state != ProcessExit::Running)
            .await
            .map(|state| *state);

        match state {
            Ok(ProcessExit::Exited(status)) => Ok(status),
            _ => Err(Error::StatusUnavailable(self.pid)),
        }
    }

    /// Sends a signal to the process.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal could not be sent.
    #[allow(clippy::cast_possible_wrap)]
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = Pid::from_raw(self.pid as i32);
        signal::kill(pid, signal).map_err(|e| Error::Signal(self.pid, e))
    }

    /// Shuts down the process and waits until it has exited.
    ///
    /// Safe to call more than once, and after the process exited by itself.
    ///
    /// # Errors
    ///
    /// Currently infallible; the result is kept for symmetry with spawning.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down {} (pid {})", self.name, self.pid);

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        info!("{} shut down", self.name);
        Ok(())
    }
}

impl Drop for IsolatedProcess {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Spawns isolated processes.
pub struct IsolatedProcessSpawner {
    application: Arc<dyn IsolatedApplication>,
}

impl IsolatedProcessSpawner {
    /// Creates a new `IsolatedProcessSpawner`.
    #[must_use]
    pub fn new(application: Arc<dyn IsolatedApplication>) -> Self {
        Self { application }
    }

    /// Spawns the application as a child process.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be spawned.
    pub fn spawn(&self) -> Result<IsolatedProcess> {
        let application = Arc::clone(&self.application);
        let shutdown_token = CancellationToken::new();
        let task_tracker = TaskTracker::new();

        let mut cmd = Command::new(application.executable());
        cmd.args(application.args());

        if let Some(working_dir) = application.working_dir() {
            cmd.current_dir(working_dir);
        }

        for (key, value) in application.env() {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!("Spawning process: {:?}", cmd);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Io("Failed to spawn process", e))?;

        let pid = child.id().ok_or_else(|| {
            Error::SpawnProcess("No PID available for spawned process".to_string())
        })?;

        debug!("{} spawned with PID: {}", application.name(), pid);

        if let Some(stdout) = child.stdout.take() {
            let application = Arc::clone(&application);
            task_tracker.spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    application.handle_stdout(&line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let application = Arc::clone(&application);
            task_tracker.spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    application.handle_stderr(&line);
                }
            });
        }

        let (exit_tx, exit_rx) = watch::channel(ProcessExit::Running);
        let name = application.name().to_string();
        let shutdown_signal = application.shutdown_signal();
        let shutdown_timeout = application.shutdown_timeout();
        let monitor_token = shutdown_token.clone();
        #[allow(clippy::cast_possible_wrap)]
        let raw_pid = Pid::from_raw(pid as i32);

        task_tracker.spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => collect_exit(&name, status),
                () = monitor_token.cancelled() => {
                    info!("shutdown requested, terminating {} with {}", name, shutdown_signal);

                    if let Err(err) = signal::kill(raw_pid, shutdown_signal) {
                        error!("failed to send {} to {}: {}", shutdown_signal, name, err);
                    }

                    if let Ok(status) = tokio::time::timeout(shutdown_timeout, child.wait()).await {
                        collect_exit(&name, status)
                    } else {
                        error!("timeout waiting for {} to exit, killing...", name);
                        if let Err(err) = child.kill().await {
                            error!("failed to kill {}: {}", name, err);
                        }
                        collect_exit(&name, child.wait().await)
                    }
                }
            };

            exit_tx.send_replace(exit);
        });

        task_tracker.close();

        Ok(IsolatedProcess {
            exit_rx,
            name: self.application.name().to_string(),
            pid,
            shutdown_token,
            task_tracker,
        })
    }
}

fn collect_exit(name: &str, status: std::io::Result<ExitStatus>) -> ProcessExit {
    match status {
        Ok(status) => {
            if status.success() {
                info!("{} exited with status: {}", name, status);
            } else {
                warn!("{} exited with non-zero status: {}", name, status);
            }
            ProcessExit::Exited(status)
        }
        Err(err) => {
            error!("failed to wait for {}: {}", name, err);
            ProcessExit::Lost
        }
    }
}
