use std::time::Duration;

use thiserror::Error;

use crate::RouterState;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring, starting or running the router.
#[derive(Debug, Error)]
pub enum Error {
    /// The router binary could not be located.
    #[error("router binary not found")]
    BinaryNotFound,

    /// The router configuration is invalid.
    #[error("invalid router configuration: {0}")]
    Configuration(String),

    /// The supervisor is not in a state that allows the operation.
    #[error("router supervisor is {0}")]
    InvalidState(RouterState),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Error from the process isolation layer.
    #[error(transparent)]
    Isolation(#[from] keel_isolation::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The router process reported a failure, or exited, before becoming ready.
    #[error("router startup failed: {0}")]
    StartupFailure(String),

    /// The router did not report readiness within the deadline.
    #[error("router startup timed out after {0:?}")]
    StartupTimeout(Duration),
}
