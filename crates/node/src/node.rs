use std::collections::BTreeMap;
use std::sync::Arc;

use keel_router::{RouterReady, RouterState, RouterSupervisor, RouterSupervisorOptions};
use keel_rpc::{EndpointPool, ResilientRpcClient};
use serde_json::Value;
use tracing::info;

use crate::NodeConfig;
use crate::error::{Error, Result};
use crate::tasks::{TaskHeader, TaskId, TaskRegistry};

/// Read-only views of node state consumed by external gateways.
pub trait NodeLookups: Send + Sync {
    /// Effective node settings, keyed by name.
    fn settings(&self) -> BTreeMap<String, Value>;

    /// Tasks the node knows about, keyed by task id.
    fn known_tasks(&self) -> BTreeMap<TaskId, TaskHeader>;
}

/// A node: the supervised message router plus the blockchain RPC client.
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    router: RouterSupervisor,
    rpc_client: Arc<ResilientRpcClient>,
    tasks: TaskRegistry,
}

impl Node {
    /// Assembles a node without starting anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the router binary
    /// cannot be found, or the data directory cannot be created.
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let router_config = config.router_config()?;

        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| Error::Io("failed to create data directory", e))?;

        let router = RouterSupervisor::new(RouterSupervisorOptions {
            config: router_config,
            router_bin: config.router_bin.clone(),
            working_dir: config.data_dir.join("router"),
            log_level: None,
            startup_timeout: Some(config.router_startup_timeout),
            shutdown_timeout: None,
        })?;

        let pool = EndpointPool::new(config.rpc_endpoints.iter().cloned())?;
        let rpc_client = Arc::new(ResilientRpcClient::http(pool, config.retry_config())?);

        Ok(Self {
            config,
            router,
            rpc_client,
            tasks: TaskRegistry::new(),
        })
    }

    /// Starts the router and waits until it is ready.
    ///
    /// # Errors
    ///
    /// Returns the router's startup error, including when the node was
    /// already started.
    pub async fn start(&self) -> Result<RouterReady> {
        let ready = self.router.start_async().await?;

        info!(
            "node ready: router at {}, rpc via {}",
            ready.url,
            self.rpc_client.active_endpoint()
        );

        Ok(ready)
    }

    /// Stops the router. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the router process could not be shut down.
    pub async fn shutdown(&self) -> Result<()> {
        self.router.stop().await?;

        info!("node shut down");
        Ok(())
    }

    /// The node configuration.
    #[must_use]
    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Readiness details of the router, while it runs.
    #[must_use]
    pub fn router_ready(&self) -> Option<RouterReady> {
        self.router.ready()
    }

    /// Lifecycle state of the router.
    #[must_use]
    pub fn router_state(&self) -> RouterState {
        self.router.state()
    }

    /// Shared handle on the blockchain RPC client.
    #[must_use]
    pub fn rpc_client(&self) -> Arc<ResilientRpcClient> {
        Arc::clone(&self.rpc_client)
    }

    /// Registry of known tasks.
    #[must_use]
    pub const fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }
}

impl NodeLookups for Node {
    fn settings(&self) -> BTreeMap<String, Value> {
        let mut settings = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        settings.insert(
            "router_state".to_string(),
            Value::String(self.router.state().to_string()),
        );
        if let Some(ready) = self.router_ready() {
            settings.insert("router_url".to_string(), Value::String(ready.url));
            settings.insert("router_pubkey".to_string(), Value::String(ready.pubkey));
        }

        settings
    }

    fn known_tasks(&self) -> BTreeMap<TaskId, TaskHeader> {
        self.tasks.snapshot()
    }
}
