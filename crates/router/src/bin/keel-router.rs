//! The message router process.
//!
//! Writes exactly one readiness report line to stdout and logs to stderr.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use keel_router::{RouterNodeOptions, event_loop, run_router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the router configuration document
    #[arg(long, env = "KEEL_ROUTER_CONFIG")]
    config: PathBuf,

    /// Log filter
    #[arg(long, default_value = "info", env = "KEEL_ROUTER_LOG_LEVEL")]
    log_level: String,

    /// Directory for the node key
    #[arg(long, env = "KEEL_ROUTER_WORKING_DIR")]
    working_dir: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let runtime = match event_loop::build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to build runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = RouterNodeOptions {
        config_path: args.config,
        working_dir: args.working_dir,
    };

    let result = runtime.block_on(async {
        let shutdown_token = CancellationToken::new();
        let signal_shutdown_token = shutdown_token.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) = match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("failed to install signal handlers: {}", e);
                    signal_shutdown_token.cancel();
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }

            signal_shutdown_token.cancel();
        });

        run_router(options, std::io::stdout(), async move {
            shutdown_token.cancelled().await;
        })
        .await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("router exited with error: {}", e);
            ExitCode::FAILURE
        }
    }
}
