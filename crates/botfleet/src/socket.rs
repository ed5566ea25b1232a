// ABOUTME: Unix socket control protocol for a running botfleet daemon.
// ABOUTME: Newline-delimited JSON requests map one-to-one onto FleetRegistry calls.

use anyhow::{bail, Context, Result};
use botfleet_core::{FleetError, StatusSnapshot, WorkerConfig};
use botfleet_supervisor::{FleetRegistry, StopOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

/// Longest request line the daemon buffers before dropping the connection.
pub const MAX_REQUEST_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Status,
    Get {
        id: String,
    },
    Add {
        bot: WorkerConfig,
        /// Start the bot right after saving it.
        #[serde(default)]
        start: bool,
    },
    Update {
        bot: WorkerConfig,
    },
    Delete {
        id: String,
    },
    Start {
        id: String,
    },
    Stop {
        id: String,
    },
    Restart {
        id: String,
    },
    Logs {
        id: String,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bots: Option<Vec<StatusSnapshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot: Option<WorkerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<StopOutcome>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Accept control connections until `shutdown` fires, then remove the socket file.
pub async fn run_socket_server(
    path: PathBuf,
    registry: Arc<FleetRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    // Remove a socket left behind by a previous daemon
    let _ = std::fs::remove_file(&path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating socket directory {}", parent.display()))?;
    }

    let listener = UnixListener::bind(&path)
        .with_context(|| format!("binding control socket {}", path.display()))?;
    tracing::info!(path = %path.display(), "Control socket listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept control connection");
                        continue;
                    }
                };
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &registry).await {
                        tracing::warn!(error = %e, "Control connection error");
                    }
                });
            }
        }
    }

    let _ = std::fs::remove_file(&path);
    tracing::info!("Control socket closed");
    Ok(())
}

async fn handle_connection(stream: UnixStream, registry: &FleetRegistry) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            break;
        }

        let oversized = read as u64 == MAX_REQUEST_BYTES && !line.ends_with('\n');
        let response = if oversized {
            Response::failure(format!("request exceeds {MAX_REQUEST_BYTES} bytes"))
        } else {
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => handle_request(request, registry).await,
                Err(e) => Response::failure(format!("invalid request: {e}")),
            }
        };
        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;

        if oversized {
            tracing::warn!("Dropping control connection after oversized request");
            break;
        }
    }

    Ok(())
}

/// Apply one request to the registry. Errors become failure responses.
pub async fn handle_request(request: Request, registry: &FleetRegistry) -> Response {
    tracing::debug!(?request, "Control request");
    match dispatch(request, registry).await {
        Ok(response) => response,
        Err(e) => Response::failure(format!("{e:#}")),
    }
}

async fn dispatch(request: Request, registry: &FleetRegistry) -> Result<Response> {
    let response = match request {
        Request::Status => Response {
            bots: Some(registry.status()),
            ..Response::ok()
        },
        Request::Get { id } => Response {
            bot: Some(registry.get(&id).await?),
            ..Response::ok()
        },
        Request::Add { bot, start } => {
            let bot = prepare(bot)?;
            let id = bot.id.clone();
            registry.add_bot(bot).await?;
            if start {
                match registry.start(&id) {
                    Ok(()) | Err(FleetError::AlreadyActive { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Response::ok()
        }
        Request::Update { bot } => {
            let bot = prepare(bot)?;
            registry.update_bot(bot).await?;
            Response::ok()
        }
        Request::Delete { id } => {
            registry.delete_bot(&id).await?;
            Response::ok()
        }
        Request::Start { id } => {
            registry.start(&id)?;
            Response::ok()
        }
        Request::Stop { id } => Response {
            outcome: Some(registry.stop(&id).await?),
            ..Response::ok()
        },
        Request::Restart { id } => {
            registry.restart(&id).await?;
            Response::ok()
        }
        Request::Logs { id } => Response {
            logs: Some(registry.logs(&id)?),
            ..Response::ok()
        },
    };
    Ok(response)
}

/// Validate an incoming config and default its display name to the id.
fn prepare(mut bot: WorkerConfig) -> Result<WorkerConfig> {
    bot.validate()?;
    if bot.name.trim().is_empty() {
        bot.name = bot.id.clone();
    }
    Ok(bot)
}

/// Send one request to the daemon and wait for its response.
pub async fn send_request(path: &Path, request: &Request) -> Result<Response> {
    let stream = UnixStream::connect(path).await.with_context(|| {
        format!(
            "connecting to {}. Is `botfleet serve` running?",
            path.display()
        )
    })?;
    let (reader, mut writer) = stream.into_split();

    let request_json = serde_json::to_string(request)? + "\n";
    writer.write_all(request_json.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        bail!("daemon closed the connection without responding");
    }

    let response: Response = serde_json::from_str(&line).context("decoding daemon response")?;
    Ok(response)
}
