use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use keel_node::{Error, FixedHeader, Node, NodeConfig, NodeLookups, TaskHeader, TaskId};
use keel_router::RouterState;
use tracing_test::traced_test;
use url::Url;

const READY_LINE: &str = r#"{"status":"ready","address":"127.0.0.1:61000","pubkey":"abcd","realm":"keel","url":"ws://127.0.0.1:61000"}"#;

fn fake_router(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-router.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(dir: &Path, router_bin: PathBuf) -> NodeConfig {
    NodeConfig {
        data_dir: dir.join("data"),
        router_allowed_origins: vec!["*".to_string()],
        router_bin: Some(router_bin),
        router_enable_status: false,
        router_host: "127.0.0.1".to_string(),
        router_port: 61000,
        router_realm: "keel".to_string(),
        router_serializers: vec!["msgpack".to_string()],
        router_startup_timeout: Duration::from_secs(10),
        rpc_endpoints: vec![
            Url::parse("http://127.0.0.1:8545").unwrap(),
            Url::parse("http://127.0.0.1:8546").unwrap(),
        ],
        rpc_max_retries: 3,
        rpc_retry_base_delay: Duration::from_millis(100),
    }
}

#[tokio::test]
#[traced_test]
async fn test_node_starts_and_shuts_down() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_router(dir.path(), &format!("echo '{READY_LINE}'\nexec sleep 30"));
    let node = Node::new(config(dir.path(), bin)).unwrap();

    let ready = node.start().await.unwrap();
    assert_eq!(ready.pubkey, "abcd");
    assert_eq!(node.router_state(), RouterState::Running);

    let settings = node.settings();
    assert_eq!(settings["router_realm"], "keel");
    assert_eq!(settings["router_state"], "running");
    assert_eq!(settings["router_url"], "ws://127.0.0.1:61000");
    assert_eq!(settings["rpc_endpoints"].as_array().unwrap().len(), 2);

    let client = node.rpc_client();
    assert_eq!(client.active_endpoint().port(), Some(8545));
    assert_eq!(client.retry_config().max_retries, 3);

    node.shutdown().await.unwrap();
    node.shutdown().await.unwrap();
    assert_eq!(node.router_state(), RouterState::Stopped);
    assert!(node.router_ready().is_none());
    assert!(logs_contain("node shut down"));
}

#[tokio::test]
async fn test_router_failure_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_router(
        dir.path(),
        r#"echo '{"status":"failed","error":"address in use"}'
exit 1"#,
    );
    let node = Node::new(config(dir.path(), bin)).unwrap();

    let result = node.start().await;
    assert!(matches!(
        result,
        Err(Error::Router(keel_router::Error::StartupFailure(_)))
    ));
    assert_eq!(node.router_state(), RouterState::Failed);
}

#[tokio::test]
async fn test_known_tasks_reflect_registry() {
    let dir = tempfile::tempdir().unwrap();
    let node = Node::new(config(dir.path(), fake_router(dir.path(), "exit 0"))).unwrap();

    node.tasks().insert(TaskHeader {
        task_id: TaskId::new("682e9b26-ed89-11e8-a9e0-6e845eabffe0"),
        fixed_header: FixedHeader {
            environment: "WASM".to_string(),
            deadline: Some(1_542_903_681),
        },
    });

    let tasks = node.known_tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[&TaskId::new("682e9b26-ed89-11e8-a9e0-6e845eabffe0")]
            .fixed_header
            .environment,
        "WASM"
    );
    assert_eq!(node.settings()["router_state"], "created");
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bin = fake_router(dir.path(), "exit 0");

    let mut bad_realm = config(dir.path(), bin.clone());
    bad_realm.router_realm = "bad realm".to_string();
    assert!(matches!(
        Node::new(bad_realm),
        Err(Error::Router(keel_router::Error::Configuration(_)))
    ));

    let mut no_endpoints = config(dir.path(), bin.clone());
    no_endpoints.rpc_endpoints.clear();
    assert!(matches!(
        Node::new(no_endpoints),
        Err(Error::Rpc(keel_rpc::Error::NoEndpoints))
    ));

    let mut duplicate = config(dir.path(), bin);
    duplicate.rpc_endpoints.push(Url::parse("http://127.0.0.1:8545").unwrap());
    assert!(matches!(Node::new(duplicate), Err(Error::Config(_))));
}
