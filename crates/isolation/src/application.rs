use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::{info, warn};

/// An application that can be run as an isolated child process.
///
/// Only [`executable`](Self::executable) and [`name`](Self::name) are
/// required; everything else has a sensible default.
pub trait IsolatedApplication: Send + Sync + 'static {
    /// Arguments passed to the executable.
    fn args(&self) -> Vec<String> {
        Vec::new()
    }

    /// Extra environment variables for the process.
    fn env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Path to the executable.
    fn executable(&self) -> &str;

    /// Called for every line the process writes to stderr.
    fn handle_stderr(&self, line: &str) {
        warn!(target: "isolation", "{} stderr: {}", self.name(), line);
    }

    /// Called for every line the process writes to stdout.
    fn handle_stdout(&self, line: &str) {
        info!(target: "isolation", "{} stdout: {}", self.name(), line);
    }

    /// Human readable name, used in logs.
    fn name(&self) -> &str;

    /// Signal sent to request a graceful shutdown.
    fn shutdown_signal(&self) -> Signal {
        Signal::SIGTERM
    }

    /// How long to wait after the shutdown signal before killing the process.
    fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Working directory of the process.
    fn working_dir(&self) -> Option<PathBuf> {
        None
    }
}
