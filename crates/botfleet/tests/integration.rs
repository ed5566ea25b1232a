// ABOUTME: Integration tests for the botfleet control socket.
// ABOUTME: Runs a real socket server over a temp dir and drives it with send_request.

use botfleet::socket::{run_socket_server, send_request, Request, MAX_REQUEST_BYTES};
use botfleet_core::{LifecycleState, SupervisorSettings, WorkerConfig};
use botfleet_store::MemoryStore;
use botfleet_supervisor::{from_fn, FleetRegistry, StopOutcome, WorkerCatalog, WorkerContext};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Daemon {
    _dir: TempDir,
    socket: PathBuf,
    shutdown: CancellationToken,
    server: JoinHandle<anyhow::Result<()>>,
    registry: Arc<FleetRegistry>,
}

async fn start_daemon() -> Daemon {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("run").join("botfleet.sock");

    let catalog = WorkerCatalog::new().with(
        "echo",
        from_fn(|ctx: WorkerContext| async move {
            ctx.log.line(format!("hello from {}", ctx.config.name));
            ctx.cancel.cancelled().await;
            anyhow::Ok(())
        }),
    );
    let registry = Arc::new(FleetRegistry::new(
        Arc::new(MemoryStore::new()),
        catalog,
        SupervisorSettings::default(),
    ));
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(run_socket_server(
        socket.clone(),
        Arc::clone(&registry),
        shutdown.clone(),
    ));
    wait_for_socket(&socket).await;

    Daemon {
        _dir: dir,
        socket,
        shutdown,
        server,
        registry,
    }
}

async fn wait_for_socket(path: &Path) {
    for _ in 0..100 {
        if UnixStream::connect(path).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("socket {} never came up", path.display());
}

#[tokio::test]
async fn test_full_bot_lifecycle_over_socket() {
    let daemon = start_daemon().await;
    let sock = &daemon.socket;

    let bot = WorkerConfig::new("document-bot", "echo").with_name("Documents");
    let response = send_request(sock, &Request::Add { bot, start: true })
        .await
        .unwrap();
    assert!(response.success, "{:?}", response.error);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = send_request(sock, &Request::Status).await.unwrap();
    let bots = status.bots.unwrap();
    assert_eq!(bots.len(), 1);
    assert_eq!(bots[0].status, LifecycleState::Running);

    let logs = send_request(
        sock,
        &Request::Logs {
            id: "document-bot".into(),
        },
    )
    .await
    .unwrap()
    .logs
    .unwrap();
    assert!(logs[0].ends_with("[document-bot] hello from Documents"));

    let got = send_request(
        sock,
        &Request::Get {
            id: "document-bot".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(got.bot.unwrap().name, "Documents");

    let stopped = send_request(
        sock,
        &Request::Stop {
            id: "document-bot".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(stopped.outcome, Some(StopOutcome::Stopped));

    let deleted = send_request(
        sock,
        &Request::Delete {
            id: "document-bot".into(),
        },
    )
    .await
    .unwrap();
    assert!(deleted.success);

    let missing = send_request(
        sock,
        &Request::Start {
            id: "document-bot".into(),
        },
    )
    .await
    .unwrap();
    assert!(!missing.success);
    assert_eq!(missing.error.unwrap(), "bot \"document-bot\" not found");

    daemon.shutdown.cancel();
    daemon.server.await.unwrap().unwrap();
    assert!(!daemon.socket.exists());
}

#[tokio::test]
async fn test_start_twice_reports_already_active() {
    let daemon = start_daemon().await;
    let sock = &daemon.socket;

    let bot = WorkerConfig::new("link-bot", "echo");
    assert!(send_request(sock, &Request::Add { bot, start: true })
        .await
        .unwrap()
        .success);

    let again = send_request(
        sock,
        &Request::Start {
            id: "link-bot".into(),
        },
    )
    .await
    .unwrap();
    assert!(!again.success);
    assert!(again.error.unwrap().contains("already"));

    // Name defaults to the id when omitted on the wire.
    assert_eq!(daemon.registry.status()[0].name, "link-bot");

    daemon.registry.stop_all().await;
    daemon.shutdown.cancel();
}

#[tokio::test]
async fn test_invalid_requests_keep_connection_open() {
    let daemon = start_daemon().await;

    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    writer.write_all(b"{not json}\n").await.unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["error"]
        .as_str()
        .unwrap()
        .starts_with("invalid request"));

    let bad_id = json!({"type": "add", "bot": {"id": "no spaces", "kind": "echo"}});
    writer
        .write_all(format!("{bad_id}\n").as_bytes())
        .await
        .unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["error"].as_str().unwrap().contains("invalid config"));

    writer
        .write_all(b"{\"type\":\"status\"}\n")
        .await
        .unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["bots"], json!([]));

    daemon.shutdown.cancel();
}

#[tokio::test]
async fn test_oversized_request_closes_connection() {
    let daemon = start_daemon().await;

    let stream = UnixStream::connect(&daemon.socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let flood = tokio::spawn(async move {
        let chunk = vec![b'x'; 64 * 1024];
        let mut sent = 0u64;
        while sent <= MAX_REQUEST_BYTES {
            if writer.write_all(&chunk).await.is_err() {
                break;
            }
            sent += chunk.len() as u64;
        }
    });

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["error"].as_str().unwrap().contains("exceeds"));

    // Closed: either a clean EOF or a reset, depending on unread bytes.
    line.clear();
    assert!(matches!(reader.read_line(&mut line).await, Ok(0) | Err(_)));
    flood.await.unwrap();

    // The daemon keeps serving other clients.
    let status = send_request(&daemon.socket, &Request::Status).await.unwrap();
    assert!(status.success);
    daemon.shutdown.cancel();
}

#[tokio::test]
async fn test_send_request_without_daemon_fails() {
    let dir = TempDir::new().unwrap();
    let err = send_request(&dir.path().join("missing.sock"), &Request::Status)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("botfleet serve"));
}
