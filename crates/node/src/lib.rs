//! Node wiring: the supervised message router, the blockchain RPC client, and
//! the read-only lookups external gateways consume.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod error;
mod node;
mod tasks;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use node::{Node, NodeLookups};
pub use tasks::{FixedHeader, TaskHeader, TaskId, TaskRegistry};
