// ABOUTME: Built-in "process" worker kind that supervises an external command.
// ABOUTME: Streams stdout/stderr into the worker log and kills the child on cancellation.

use crate::log_buffer::LogSink;
use crate::worker::{WorkerBody, WorkerContext};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use botfleet_core::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Kind name the process worker is registered under.
pub const KIND: &str = "process";

/// How long to keep draining output after the child exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// `params` accepted by the process worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    /// Program to run, resolved through PATH.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables, added on top of the daemon's environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

impl ProcessParams {
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let params: Self = serde_json::from_value(config.params.clone())
            .with_context(|| format!("invalid params for bot {}", config.id))?;
        if params.command.trim().is_empty() {
            bail!("params.command is required for bot {}", config.id);
        }
        Ok(params)
    }
}

/// Runs `params.command` as a child process for as long as the bot is active.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessWorker;

#[async_trait]
impl WorkerBody for ProcessWorker {
    async fn run(&self, ctx: WorkerContext) -> Result<()> {
        let params = ProcessParams::from_config(&ctx.config)?;

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &params.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", params.command))?;

        info!(worker = %ctx.config.id, pid = ?child.id(), command = %params.command, "Spawned process");

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, ctx.log.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, ctx.log.clone())));
        }

        let status = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                terminate(&mut child, &ctx.config.id).await;
                return Ok(());
            }
            status = child.wait() => status.context("waiting for process")?,
        };

        // Grandchildren may hold the pipes open; do not wait on them forever.
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, futures::future::join_all(readers)).await;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => bail!("process exited with code {code}"),
            None => bail!("process terminated by signal"),
        }
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, log: LogSink) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log.line(line);
    }
}

async fn terminate(child: &mut Child, id: &str) {
    if let Err(e) = child.kill().await {
        warn!(worker = %id, error = %e, "Failed to kill process");
    }
}
