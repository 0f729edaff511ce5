use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::endpoint_pool::EndpointPool;
use crate::error::{Error, Result};
use crate::http::HttpTransport;
use crate::retry::RetryConfig;
use crate::transport::RpcTransport;

#[derive(Debug)]
struct ClientState {
    consecutive_errors: usize,
    generation: u64,
    pool: EndpointPool,
}

/// What to do after a retryable failure.
enum Next {
    Exhausted,
    Retry(Duration),
}

/// RPC client that retries transient failures and fails over across endpoints.
///
/// Each endpoint gets `max_retries` consecutive attempts before the client
/// rotates to the next one. A successful call makes every configured endpoint
/// eligible again, and so does running out of endpoints: the call fails with
/// [`Error::ExhaustedEndpoints`] and the next call starts over from the first
/// endpoint. The client is `Send + Sync` and meant to be shared behind
/// an `Arc`; concurrent calls observe a single active endpoint.
#[derive(Debug)]
pub struct ResilientRpcClient<T = HttpTransport> {
    retry: RetryConfig,
    state: Mutex<ClientState>,
    transport: T,
}

impl ResilientRpcClient<HttpTransport> {
    /// Creates a client speaking JSON-RPC over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the HTTP client cannot be built.
    pub fn http(pool: EndpointPool, retry: RetryConfig) -> Result<Self> {
        Ok(Self::new(pool, HttpTransport::new()?, retry))
    }
}

impl<T: RpcTransport> ResilientRpcClient<T> {
    /// Creates a client over `pool` using `transport` for single requests.
    #[must_use]
    pub fn new(pool: EndpointPool, transport: T, retry: RetryConfig) -> Self {
        let retry = RetryConfig {
            max_retries: retry.max_retries.max(1),
            ..retry
        };

        Self {
            retry,
            state: Mutex::new(ClientState {
                consecutive_errors: 0,
                generation: 0,
                pool,
            }),
            transport,
        }
    }

    /// Calls `method`, retrying and failing over as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fatal`] on the first non-retryable failure, or
    /// [`Error::ExhaustedEndpoints`] once every remaining endpoint has failed.
    #[instrument(skip(self, params))]
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let mut attempts = 0;

        loop {
            let (endpoint, generation) = {
                let state = self.state.lock();
                (state.pool.active().clone(), state.generation)
            };

            attempts += 1;

            let error = match self.transport.request(&endpoint, method, params).await {
                Ok(value) => {
                    let mut state = self.state.lock();
                    state.consecutive_errors = 0;
                    state.pool.reset();

                    if attempts > 1 {
                        debug!("{} succeeded on {} after {} attempts", method, endpoint, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!("{} failed on {}: {}", method, endpoint, e);
                    return Err(Error::Fatal(e));
                }
                Err(e) => e,
            };

            match self.record_failure(&endpoint, generation) {
                Next::Retry(delay) => {
                    debug!("{} failed on {}, retrying: {}", method, endpoint, error);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Next::Exhausted => {
                    error!("{} failed on every endpoint: {}", method, error);
                    return Err(Error::ExhaustedEndpoints {
                        method: method.to_string(),
                        attempts,
                    });
                }
            }
        }
    }

    fn record_failure(&self, endpoint: &Url, generation: u64) -> Next {
        let mut state = self.state.lock();

        if state.generation != generation {
            debug!("ignoring failure on {}, already rotated away", endpoint);
            return Next::Retry(Duration::ZERO);
        }

        state.consecutive_errors += 1;
        if state.consecutive_errors < self.retry.max_retries {
            return Next::Retry(self.retry.delay(state.consecutive_errors));
        }

        state.consecutive_errors = 0;
        match state.pool.next().cloned() {
            Some(next) => {
                state.generation += 1;
                info!("endpoint {} failed repeatedly, switching to {}", endpoint, next);
                Next::Retry(Duration::ZERO)
            }
            None => {
                state.pool.restart();
                state.generation += 1;
                Next::Exhausted
            }
        }
    }

    /// The endpoint requests currently go to.
    #[must_use]
    pub fn active_endpoint(&self) -> Url {
        self.state.lock().pool.active().clone()
    }

    /// Retryable failures in a row on the active endpoint.
    #[must_use]
    pub fn consecutive_errors(&self) -> usize {
        self.state.lock().consecutive_errors
    }

    /// Number of rotations so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Endpoints as configured.
    #[must_use]
    pub fn original_endpoints(&self) -> Vec<Url> {
        self.state.lock().pool.original().to_vec()
    }

    /// Endpoints still eligible for failover.
    #[must_use]
    pub fn remaining_endpoints(&self) -> Vec<Url> {
        self.state.lock().pool.remaining()
    }

    /// The retry policy in effect.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        self.retry
    }
}
