//! Resilient JSON-RPC access to a pool of equivalent endpoints.
//!
//! [`ResilientRpcClient`] sends every call to one active endpoint from an
//! [`EndpointPool`]. Transient failures (see [`TransportError::is_retryable`])
//! are retried on the same endpoint up to [`RetryConfig::max_retries`] times in
//! a row, then the client fails over to the next endpoint. Callers only see
//! non-retryable failures and pool exhaustion.
//!
//! # Example
//!
//! ```rust,no_run
//! use keel_rpc::{EndpointPool, ResilientRpcClient, RetryConfig};
//!
//! async fn block_number() -> keel_rpc::Result<serde_json::Value> {
//!     let pool = EndpointPool::parse([
//!         "https://rpc-1.example.com",
//!         "https://rpc-2.example.com",
//!     ])?;
//!     let client = ResilientRpcClient::http(pool, RetryConfig::default())?;
//!
//!     client.call("eth_blockNumber", &[]).await
//! }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod client;
mod endpoint_pool;
mod error;
mod http;
mod retry;
mod transport;

pub use client::ResilientRpcClient;
pub use endpoint_pool::EndpointPool;
pub use error::{Error, Result};
pub use http::HttpTransport;
pub use retry::RetryConfig;
pub use transport::{RpcTransport, TransportError};
