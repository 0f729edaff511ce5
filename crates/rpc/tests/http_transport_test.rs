use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use keel_rpc::{
    EndpointPool, Error, HttpTransport, ResilientRpcClient, RetryConfig, RpcTransport,
    TransportError,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing_test::traced_test;
use url::Url;

async fn echo(Json(request): Json<Value>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": { "method": request["method"], "params": request["params"] },
    }))
}

async fn reverted(Json(request): Json<Value>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "error": { "code": -32000, "message": "execution reverted" },
    }))
}

async fn gateway_page() -> &'static str {
    "<html>502 bad gateway</html>"
}

async fn unavailable() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn stalled() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(30)).await;
    Json(json!({ "jsonrpc": "2.0", "id": 1, "result": null }))
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/", post(echo))
        .route("/reverted", post(reverted))
        .route("/html", post(gateway_page))
        .route("/unavailable", post(unavailable))
        .route("/stalled", post(stalled));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    addr
}

/// An address nothing listens on.
async fn dead_endpoint() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    Url::parse(&format!("http://{addr}/")).unwrap()
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

#[tokio::test]
async fn test_request_round_trip() {
    let addr = serve().await;
    let transport = HttpTransport::new().unwrap();

    let result = transport
        .request(&url(addr, "/"), "eth_getBalance", &[json!("0xabc"), json!("latest")])
        .await
        .unwrap();

    assert_eq!(result["method"], "eth_getBalance");
    assert_eq!(result["params"], json!(["0xabc", "latest"]));
}

#[tokio::test]
async fn test_failure_classification() {
    let addr = serve().await;
    let transport = HttpTransport::new().unwrap();

    let missing = transport.request(&url(addr, "/missing"), "eth_chainId", &[]).await;
    assert!(matches!(missing, Err(TransportError::CannotHandleRequest(_))));

    let html = transport.request(&url(addr, "/html"), "eth_chainId", &[]).await;
    assert!(matches!(html, Err(TransportError::Malformed(_))));

    let unavailable = transport.request(&url(addr, "/unavailable"), "eth_chainId", &[]).await;
    assert!(matches!(unavailable, Err(TransportError::Connection(_))));

    let refused = transport.request(&dead_endpoint().await, "eth_chainId", &[]).await;
    assert!(matches!(refused, Err(TransportError::Connection(_))));

    let reverted = transport.request(&url(addr, "/reverted"), "eth_call", &[]).await;
    assert_eq!(
        reverted,
        Err(TransportError::Rpc {
            code: -32000,
            message: "execution reverted".to_string()
        })
    );
}

#[tokio::test]
async fn test_request_times_out() {
    let addr = serve().await;
    let transport = HttpTransport::with_timeout(Duration::from_millis(200)).unwrap();

    let started = Instant::now();
    let stalled = transport.request(&url(addr, "/stalled"), "eth_syncing", &[]).await;

    assert!(matches!(stalled, Err(TransportError::Connection(_))));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
#[traced_test]
async fn test_client_fails_over_to_live_endpoint() {
    let addr = serve().await;
    let live = url(addr, "/");
    let pool = EndpointPool::new([dead_endpoint().await, url(addr, "/html"), live.clone()]).unwrap();
    let client = ResilientRpcClient::http(pool, RetryConfig::immediate()).unwrap();

    let result = client.call("eth_blockNumber", &[]).await.unwrap();

    assert_eq!(result["method"], "eth_blockNumber");
    assert_eq!(client.active_endpoint(), live);
    assert_eq!(client.remaining_endpoints(), client.original_endpoints());
    assert_eq!(client.generation(), 2);
    assert!(logs_contain("switching to"));
}

#[tokio::test]
async fn test_client_surfaces_rpc_errors() {
    let addr = serve().await;
    let pool = EndpointPool::new([url(addr, "/reverted"), url(addr, "/")]).unwrap();
    let client = ResilientRpcClient::http(pool, RetryConfig::immediate()).unwrap();

    let result = client.call("eth_call", &[json!({ "to": "0x0" })]).await;

    assert!(matches!(
        result,
        Err(Error::Fatal(TransportError::Rpc { code: -32000, .. }))
    ));
    assert_eq!(client.active_endpoint(), url(addr, "/reverted"));
}
