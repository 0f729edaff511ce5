use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// The node configuration is inconsistent.
    #[error("invalid node configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0} - {1}")]
    Io(&'static str, #[source] std::io::Error),

    /// Router error.
    #[error(transparent)]
    Router(#[from] keel_router::Error),

    /// RPC client error.
    #[error(transparent)]
    Rpc(#[from] keel_rpc::Error),
}
