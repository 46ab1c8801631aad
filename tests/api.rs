//! End-to-end: real listener, real HTTP client, real file on disk.

use std::path::Path;
use std::time::Duration;

use mcp_manager::client::api::write_through;
use mcp_manager::{
    AppState, ClientError, ConfigDocument, ConfigStore, HttpApi, ManagerApi, serve,
};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SAMPLE: &str = r#"{
  "mcpServers": {
    "awslabs.core-mcp-server": { "command": "uvx", "args": ["awslabs.core-mcp-server@latest"], "timeout": 60 },
    "github": { "command": "docker", "args": ["run", "-i"], "disabled": true }
  },
  "schemaVersion": 1
}"#;

async fn start(config: &Path) -> (HttpApi, CancellationToken, JoinHandle<std::io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let token = CancellationToken::new();
    let state = AppState::new(ConfigStore::new(config), port, token.clone())
        .with_shutdown_grace(Duration::from_millis(50));
    let handle = tokio::spawn(serve(listener, state));
    (HttpApi::new(format!("http://127.0.0.1:{port}")), token, handle)
}

fn backups_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("mcp.json.backup."))
        .collect()
}

#[tokio::test]
async fn test_toggle_round_trip_over_http() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("mcp.json");
    std::fs::write(&config, SAMPLE).expect("seed");
    let (api, token, handle) = start(&config).await;

    let health = api.health().await.expect("health");
    assert!(health.success);
    assert!(health.config_path.ends_with("mcp.json"));

    let started = api.start_server().await.expect("start server");
    assert_eq!(started.message, "Server is already running");
    assert_eq!(started.url, format!("http://localhost:{}", health.port));

    let loaded = api.get_config().await.expect("get config");
    assert_eq!(loaded.document.server_names(), vec!["awslabs.core-mcp-server", "github"]);

    let mut document = loaded.document;
    assert_eq!(document.toggle("github"), Some(false));
    let path = write_through(&api, &document).await.expect("write");
    assert!(path.ends_with("mcp.json"));

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config).expect("read")).expect("json");
    assert_eq!(on_disk["mcpServers"]["github"]["disabled"], serde_json::json!(false));
    assert_eq!(on_disk["mcpServers"]["awslabs.core-mcp-server"]["timeout"], serde_json::json!(60));
    assert_eq!(on_disk["schemaVersion"], serde_json::json!(1));

    let backups = backups_in(dir.path());
    assert_eq!(backups.len(), 1);
    let backup = std::fs::read_to_string(dir.path().join(&backups[0])).expect("backup");
    assert_eq!(backup, SAMPLE);

    token.cancel();
    handle.await.expect("join").expect("serve");
}

#[tokio::test]
async fn test_invalid_write_is_rejected_and_file_untouched() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("mcp.json");
    std::fs::write(&config, SAMPLE).expect("seed");
    let (api, token, handle) = start(&config).await;

    let mut raw = api.get_config().await.expect("get config").document.to_value();
    raw["mcpServers"]["broken"] = serde_json::json!({ "command": "", "args": [] });
    let document = ConfigDocument::from_value(raw).expect("object");

    let err = write_through(&api, &document).await.expect_err("must be rejected");
    assert_eq!(
        err,
        ClientError::Invalid(vec!["Server \"broken\" is missing command".to_string()])
    );

    // The put side validates too, independently of the client.
    let err = api.put_config(&document).await.expect_err("must be rejected");
    assert!(matches!(err, ClientError::Invalid(_)));

    assert_eq!(std::fs::read_to_string(&config).expect("read"), SAMPLE);
    assert!(backups_in(dir.path()).is_empty());

    token.cancel();
    handle.await.expect("join").expect("serve");
}

#[tokio::test]
async fn test_missing_file_reports_path() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("mcp.json");
    let (api, token, handle) = start(&config).await;

    match api.get_config().await {
        Err(ClientError::Rejected { status, message }) => {
            assert_eq!(status, 404);
            assert!(message.contains("not found"));
        }
        other => panic!("expected 404, got {other:?}"),
    }

    token.cancel();
    handle.await.expect("join").expect("serve");
}

#[tokio::test]
async fn test_shutdown_stops_server_after_grace() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("mcp.json");
    let (api, _token, handle) = start(&config).await;

    let ack = api.shutdown().await.expect("shutdown");
    assert_eq!(ack.message, "Server shutdown initiated");

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop after the grace delay")
        .expect("join")
        .expect("serve");

    let err = api.health().await.expect_err("server is gone");
    assert!(err.is_unreachable());
}
