//! Error types for isolation operations.

use std::io;

use thiserror::Error;

/// Result type for isolation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during isolation operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] io::Error),

    /// Failed to deliver a signal to the process.
    #[error("failed to signal process {0}: {1}")]
    Signal(u32, #[source] nix::Error),

    /// Failed to spawn a process
    #[error("Failed to spawn process: {0}")]
    SpawnProcess(String),

    /// The exit status of the process could not be observed.
    #[error("exit status of process {0} is unavailable")]
    StatusUnavailable(u32),
}
