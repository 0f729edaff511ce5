//! JSON-RPC 2.0 over HTTP POST.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::trace;
use url::Url;

use crate::error::Error;
use crate::transport::{RpcTransport, TransportError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC "method not found".
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Talks JSON-RPC 2.0 to HTTP endpoints.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport with a 30 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn new() -> crate::Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a transport whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self::with_client(client))
    }

    /// Creates a transport over an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(
        &self,
        endpoint: &Url,
        method: &str,
        params: &[Value],
    ) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("POST {} {} (id {})", endpoint, method, id);

        let response = self
            .client
            .post(endpoint.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                return Err(TransportError::CannotHandleRequest(format!(
                    "{endpoint} answered {status}"
                )));
            }
            status if status.is_server_error() => {
                return Err(TransportError::Connection(format!(
                    "{endpoint} answered {status}"
                )));
            }
            status if status.is_client_error() => {
                return Err(TransportError::Other(format!("{endpoint} answered {status}")));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        parse_response(&body)
    }
}

fn classify_send_error(error: &reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::Other(error.to_string())
    } else {
        TransportError::Connection(error.to_string())
    }
}

fn parse_response(body: &str) -> Result<Value, TransportError> {
    let mut reply: Value =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))?;

    if let Some(error) = reply.get("error").filter(|error| !error.is_null()) {
        let error = JsonRpcError::deserialize(error)
            .map_err(|e| TransportError::Malformed(format!("invalid error object: {e}")))?;

        return Err(if error.code == METHOD_NOT_FOUND {
            TransportError::CannotHandleRequest(error.message)
        } else {
            TransportError::Rpc {
                code: error.code,
                message: error.message,
            }
        });
    }

    reply
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| TransportError::Malformed("response has neither result nor error".into()))
}
