//! Router process entry point.

use std::future::{Future, IntoFuture};
use std::io::Write;
use std::path::PathBuf;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::keys::ensure_node_key;
use crate::report::{RouterReady, RouterReport};
use crate::config::ws_url;
use crate::{RouterConfig, transport};

/// Options for running a router node.
#[derive(Clone, Debug)]
pub struct RouterNodeOptions {
    /// Path to the configuration document.
    pub config_path: PathBuf,

    /// Directory for runtime artifacts such as the node key.
    pub working_dir: PathBuf,
}

/// Runs the router until `shutdown` resolves.
///
/// Exactly one [`RouterReport`] is written to `report_out`: a failure if the
/// configuration cannot be loaded, the node key cannot be prepared, or the
/// listener cannot be bound; otherwise a ready report once the listener is up.
///
/// # Errors
///
/// Returns the startup error after reporting it, or an error if serving fails.
pub async fn run_router<W, F>(options: RouterNodeOptions, report_out: W, shutdown: F) -> Result<()>
where
    W: Write,
    F: Future<Output = ()> + Send + 'static,
{
    let (config, listener, ready) = match prepare(&options).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("router startup failed: {}", e);
            RouterReport::from(&e).write_to(report_out)?;
            return Err(e);
        }
    };

    info!("router listening on {} (realm {})", ready.url, ready.realm);
    RouterReport::Ready(ready).write_to(report_out)?;

    axum::serve(listener, transport::router(config))
        .with_graceful_shutdown(shutdown)
        .into_future()
        .await
        .map_err(|e| Error::Io("router transport failed", e))?;

    info!("router stopped");
    Ok(())
}

async fn prepare(options: &RouterNodeOptions) -> Result<(RouterConfig, TcpListener, RouterReady)> {
    let config = RouterConfig::read_document(&options.config_path)?;

    tokio::fs::create_dir_all(&options.working_dir)
        .await
        .map_err(|e| Error::Io("failed to create working directory", e))?;
    let pubkey = ensure_node_key(&options.working_dir).await?;

    let listener = TcpListener::bind((config.host(), config.port()))
        .await
        .map_err(|e| Error::Io("failed to bind router transport", e))?;
    let address = listener
        .local_addr()
        .map_err(|e| Error::Io("failed to read bound address", e))?;

    let ready = RouterReady {
        address,
        pubkey,
        realm: config.realm().to_string(),
        url: ws_url(config.host(), address.port()),
    };

    Ok((config, listener, ready))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn options(dir: &std::path::Path) -> RouterNodeOptions {
        RouterNodeOptions {
            config_path: dir.join("config.json"),
            working_dir: dir.join("work"),
        }
    }

    #[tokio::test]
    async fn test_reports_ready_then_serves_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = RouterConfig::builder("127.0.0.1", 0, "keel")
            .enable_status(true)
            .build()
            .unwrap();
        config.write_document(&dir.path().join("config.json")).unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let output = Arc::new(Mutex::new(Vec::new()));

        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let handle = tokio::spawn(run_router(
            options(dir.path()),
            Sink(Arc::clone(&output)),
            async {
                let _ = stop_rx.await;
            },
        ));

        let ready = loop {
            {
                let bytes = output.lock().unwrap();
                if bytes.ends_with(b"\n") {
                    break RouterReport::parse(std::str::from_utf8(&bytes).unwrap()).unwrap();
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        };

        let RouterReport::Ready(ready) = ready else {
            panic!("expected ready report, got {ready:?}");
        };
        assert_ne!(ready.address.port(), 0);

        let status: serde_json::Value = reqwest::get(format!("http://{}/", ready.address))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["realm"], "keel");

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert!(dir.path().join("work").join("key.pub").exists());
    }

    #[tokio::test]
    async fn test_missing_config_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let result = run_router(options(dir.path()), &mut out, async {}).await;

        assert!(result.is_err());
        let report = RouterReport::parse(std::str::from_utf8(&out).unwrap()).unwrap();
        assert!(matches!(report, RouterReport::Failed { .. }));
    }
}
