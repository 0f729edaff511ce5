//! Primitives for running third-party programs as supervised child processes.
//!
//! A child is described by an [`IsolatedApplication`] and spawned with
//! [`spawn`]. The returned [`IsolatedProcess`] is the sole owner of the child:
//! it forwards the child's output line by line to the application, observes
//! its exit, and terminates it with a graceful signal followed by a kill.
//!
//! # Example
//!
//! ```rust,no_run
//! use keel_isolation::{IsolatedApplication, Result, spawn};
//!
//! struct MyApp;
//!
//! impl IsolatedApplication for MyApp {
//!     fn args(&self) -> Vec<String> {
//!         vec!["--config=/etc/config.json".to_string()]
//!     }
//!
//!     fn executable(&self) -> &str {
//!         "path/to/app"
//!     }
//!
//!     fn name(&self) -> &str {
//!         "my-app"
//!     }
//! }
//!
//! async fn run() -> Result<()> {
//!     let process = spawn(MyApp)?;
//!
//!     // Shut down when done
//!     process.shutdown().await?;
//!
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod application;
mod error;
mod spawn;

use std::sync::Arc;

pub use application::IsolatedApplication;
pub use error::{Error, Result};
pub use nix::sys::signal::Signal;
pub use spawn::{IsolatedProcess, IsolatedProcessSpawner, ProcessExit};

/// Spawns an isolated process for the given application.
///
/// # Errors
///
/// Returns an error if the process could not be spawned.
pub fn spawn<A: IsolatedApplication>(application: A) -> Result<IsolatedProcess> {
    spawn_shared(Arc::new(application))
}

/// Spawns an application that the caller keeps a shared handle to.
///
/// Useful when the application collects state from the child's output that
/// the caller needs to observe.
///
/// # Errors
///
/// Returns an error if the process could not be spawned.
pub fn spawn_shared(application: Arc<dyn IsolatedApplication>) -> Result<IsolatedProcess> {
    IsolatedProcessSpawner::new(application).spawn()
}
