use thiserror::Error;

use crate::TransportError;

/// Result type for RPC client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the resilient RPC client.
#[derive(Debug, Error)]
pub enum Error {
    /// Every endpoint failed `max_retries` times in a row.
    #[error("no more endpoints to try for {method} after {attempts} attempts")]
    ExhaustedEndpoints {
        /// Method being called.
        method: String,

        /// Attempts made by the failing call.
        attempts: usize,
    },

    /// A failure that retrying cannot fix.
    #[error("rpc call failed: {0}")]
    Fatal(#[source] TransportError),

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// An endpoint address could not be parsed.
    #[error("invalid endpoint {0}: {1}")]
    InvalidEndpoint(String, #[source] url::ParseError),

    /// The endpoint list was empty.
    #[error("at least one endpoint is required")]
    NoEndpoints,
}
