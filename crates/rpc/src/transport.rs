//! Single-endpoint transports and failure classification.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Why a single request against a single endpoint failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be reached or dropped the connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The endpoint answered with something that is not a JSON-RPC response.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The endpoint does not serve this kind of request.
    #[error("endpoint cannot handle request: {0}")]
    CannotHandleRequest(String),

    /// The endpoint rejected the call itself.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,

        /// Error message from the endpoint.
        message: String,
    },

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure is transient, so retrying or failing over may help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Malformed(_) | Self::CannotHandleRequest(_)
        )
    }
}

/// Sends one RPC request to one endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Calls `method` on `endpoint` and returns the result value.
    async fn request(
        &self,
        endpoint: &Url,
        method: &str,
        params: &[Value],
    ) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: RpcTransport + ?Sized> RpcTransport for Arc<T> {
    async fn request(
        &self,
        endpoint: &Url,
        method: &str,
        params: &[Value],
    ) -> Result<Value, TransportError> {
        (**self).request(endpoint, method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Connection("refused".into()).is_retryable());
        assert!(TransportError::Malformed("eof".into()).is_retryable());
        assert!(TransportError::CannotHandleRequest("404".into()).is_retryable());

        assert!(
            !TransportError::Rpc {
                code: -32000,
                message: "insufficient funds".into()
            }
            .is_retryable()
        );
        assert!(!TransportError::Other("bad request".into()).is_retryable());
    }
}
