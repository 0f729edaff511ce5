//! CLI binary to run a node locally.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use keel_node::{Error, Node, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Directory for node state
    #[arg(long, default_value = "/tmp/keel", env = "KEEL_DATA_DIR")]
    data_dir: PathBuf,

    /// Log filter
    #[arg(long, default_value = "info", env = "KEEL_LOG_LEVEL")]
    log_level: String,

    /// Origins allowed to open router sessions
    #[arg(
        long,
        default_value = "*",
        value_delimiter = ',',
        env = "KEEL_ROUTER_ALLOWED_ORIGINS"
    )]
    router_allowed_origins: Vec<String>,

    /// Path to the router binary if it is not in the PATH
    #[arg(long, env = "KEEL_ROUTER_BIN")]
    router_bin: Option<PathBuf>,

    /// Serve a status document on plain HTTP requests to the router
    #[arg(long, env = "KEEL_ROUTER_ENABLE_STATUS")]
    router_enable_status: bool,

    /// Router listen host
    #[arg(long, default_value = "localhost", env = "KEEL_ROUTER_HOST")]
    router_host: String,

    /// Router listen port
    #[arg(long, default_value_t = 61000, env = "KEEL_ROUTER_PORT")]
    router_port: u16,

    /// Router realm
    #[arg(long, default_value = "keel", env = "KEEL_ROUTER_REALM")]
    router_realm: String,

    /// Serializers the router negotiates, in order of preference
    #[arg(
        long,
        default_value = "msgpack",
        value_delimiter = ',',
        env = "KEEL_ROUTER_SERIALIZERS"
    )]
    router_serializers: Vec<String>,

    /// Seconds to wait for the router to become ready
    #[arg(long, default_value_t = 30, env = "KEEL_ROUTER_STARTUP_TIMEOUT_SECS")]
    router_startup_timeout_secs: u64,

    /// Blockchain JSON-RPC endpoints, in order of preference
    #[arg(long, required = true, value_delimiter = ',', env = "KEEL_RPC_ENDPOINTS")]
    rpc_endpoints: Vec<Url>,

    /// Consecutive failures tolerated per RPC endpoint
    #[arg(long, default_value_t = 3, env = "KEEL_RPC_MAX_RETRIES")]
    rpc_max_retries: usize,

    /// Base delay in milliseconds between RPC retries
    #[arg(long, default_value_t = 100, env = "KEEL_RPC_RETRY_BASE_DELAY_MS")]
    rpc_retry_base_delay_ms: u64,
}

impl From<Args> for NodeConfig {
    fn from(args: Args) -> Self {
        Self {
            data_dir: args.data_dir,
            router_allowed_origins: args.router_allowed_origins,
            router_bin: args.router_bin,
            router_enable_status: args.router_enable_status,
            router_host: args.router_host,
            router_port: args.router_port,
            router_realm: args.router_realm,
            router_serializers: args.router_serializers,
            router_startup_timeout: Duration::from_secs(args.router_startup_timeout_secs),
            rpc_endpoints: args.rpc_endpoints,
            rpc_max_retries: args.rpc_max_retries,
            rpc_retry_base_delay: Duration::from_millis(args.rpc_retry_base_delay_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    let node = Node::new(args.into())?;
    node.start().await?;

    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| Error::Io("failed to install SIGTERM handler", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| Error::Io("failed to install SIGINT handler", e))?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    info!("shutting down");
    node.shutdown().await
}
