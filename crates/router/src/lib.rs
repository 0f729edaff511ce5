//! Configures and supervises the node's message router.
//!
//! The router runs as its own OS process (the `keel-router` binary in this
//! crate). A [`RouterSupervisor`] writes the router's [`RouterConfig`] to disk,
//! spawns the process, and waits for the single [`RouterReport`] the router
//! prints once it is listening or has failed to start.
//!
//! # Example
//!
//! ```rust,no_run
//! use keel_router::{RouterConfig, RouterSupervisor, RouterSupervisorOptions};
//!
//! async fn run() -> keel_router::Result<()> {
//!     let config = RouterConfig::builder("localhost", 61000, "keel")
//!         .serializers(["msgpack", "json"])
//!         .build()?;
//!
//!     let supervisor = RouterSupervisor::new(RouterSupervisorOptions {
//!         config,
//!         router_bin: None,
//!         working_dir: "/tmp/keel-router".into(),
//!         log_level: None,
//!         startup_timeout: None,
//!         shutdown_timeout: None,
//!     })?;
//!
//!     let ready = supervisor.start_async().await?;
//!     println!("router listening at {}", ready.url);
//!
//!     supervisor.stop().await
//! }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod error;
pub mod event_loop;
mod keys;
mod node;
mod report;
mod supervisor;
mod transport;

pub use config::{
    Allow, DOCUMENT_VERSION, Endpoint, Permission, Realm, Role, RouterConfig, RouterConfigBuilder,
    RouterDocument, RouterWorker, SUPPORTED_SERIALIZERS, Transport, TransportOptions,
    WebsocketTransport, Worker, WorkerOptions,
};
pub use error::{Error, Result};
pub use keys::ensure_node_key;
pub use node::{RouterNodeOptions, run_router};
pub use report::{RouterReady, RouterReport};
pub use supervisor::{RouterState, RouterSupervisor, RouterSupervisorOptions};
