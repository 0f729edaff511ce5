use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use keel_router::RouterConfig;
use keel_rpc::RetryConfig;
use serde::Serialize;
use url::Url;

use crate::error::{Error, Result};

/// Configuration for a node instance
#[derive(Clone, Debug, Serialize)]
pub struct NodeConfig {
    /// Directory holding the node's runtime state
    pub data_dir: PathBuf,

    /// Origins allowed to open router sessions
    pub router_allowed_origins: Vec<String>,

    /// Optional path to the router binary if it is not in the PATH
    pub router_bin: Option<PathBuf>,

    /// Whether the router answers plain HTTP requests with a status document
    pub router_enable_status: bool,

    /// Router listen host
    pub router_host: String,

    /// Router listen port
    pub router_port: u16,

    /// Router realm
    pub router_realm: String,

    /// Serializers the router negotiates
    pub router_serializers: Vec<String>,

    /// How long to wait for the router to report readiness
    pub router_startup_timeout: Duration,

    /// Blockchain JSON-RPC endpoints, in order of preference
    pub rpc_endpoints: Vec<Url>,

    /// Consecutive failures tolerated per RPC endpoint before failing over
    pub rpc_max_retries: usize,

    /// Base delay between retries against the same RPC endpoint
    pub rpc_retry_base_delay: Duration,
}

impl NodeConfig {
    /// Validated router configuration.
    pub(crate) fn router_config(&self) -> Result<RouterConfig> {
        Ok(RouterConfig::builder(
            self.router_host.clone(),
            self.router_port,
            self.router_realm.clone(),
        )
        .serializers(self.router_serializers.iter().cloned())
        .allowed_origins(self.router_allowed_origins.iter().cloned())
        .enable_status(self.router_enable_status)
        .build()?)
    }

    pub(crate) fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.rpc_max_retries,
            base_delay: self.rpc_retry_base_delay,
            ..RetryConfig::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.rpc_max_retries == 0 {
            return Err(Error::Config("rpc_max_retries must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.rpc_endpoints {
            if !seen.insert(endpoint) {
                return Err(Error::Config(format!("duplicate rpc endpoint {endpoint}")));
            }
        }

        Ok(())
    }
}
