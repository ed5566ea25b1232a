// ABOUTME: `botfleet ctl`: command-line client for the control socket.
// ABOUTME: Turns subcommands into socket requests and renders the responses.

use crate::socket::{send_request, Request, Response};
use anyhow::{anyhow, Context, Result};
use botfleet_core::{Settings, WorkerConfig};
use botfleet_supervisor::{ProcessParams, StopOutcome};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Subcommand)]
pub enum CtlCommand {
    /// List every bot with its state
    Status,
    /// Show a bot's stored config
    Get { id: String },
    /// Save a new bot config
    Add {
        #[command(flatten)]
        bot: BotArgs,
        /// Start the bot once it is saved
        #[arg(long)]
        start: bool,
    },
    /// Replace a bot's config, restarting it if it is running
    Update {
        #[command(flatten)]
        bot: BotArgs,
    },
    /// Stop a bot and delete its config
    Delete { id: String },
    /// Start a stopped bot
    Start { id: String },
    /// Stop a running bot
    Stop { id: String },
    /// Stop then start a bot
    Restart { id: String },
    /// Print a bot's recent log lines
    Logs { id: String },
}

#[derive(Debug, Clone, Args)]
pub struct BotArgs {
    /// Bot id (letters, digits, '-' and '_')
    pub id: String,

    /// Worker kind
    #[arg(long, default_value = "process")]
    pub kind: String,

    /// Display name (defaults to the id)
    #[arg(long)]
    pub name: Option<String>,

    /// Raw params as a JSON object
    #[arg(long, conflicts_with_all = ["command", "args", "env", "workdir"])]
    pub params: Option<String>,

    /// Command for the process kind
    #[arg(long)]
    pub command: Option<String>,

    /// Argument passed to the command (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// KEY=VALUE added to the command's environment (repeatable)
    #[arg(long = "env", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Working directory for the command
    #[arg(long)]
    pub workdir: Option<String>,

    /// Start this bot whenever the daemon starts
    #[arg(long)]
    pub enabled: bool,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl BotArgs {
    pub fn to_config(&self) -> Result<WorkerConfig> {
        let params = match (&self.params, &self.command) {
            (Some(raw), _) => serde_json::from_str(raw).context("--params must be valid JSON")?,
            (None, Some(command)) => serde_json::to_value(ProcessParams {
                command: command.clone(),
                args: self.args.clone(),
                env: self.env.iter().cloned().collect(),
                workdir: self.workdir.clone(),
            })?,
            (None, None) => serde_json::Value::Null,
        };

        let mut config = WorkerConfig::new(&self.id, &self.kind)
            .with_params(params)
            .with_enabled(self.enabled);
        if let Some(name) = &self.name {
            config = config.with_name(name);
        }
        config.validate()?;
        Ok(config)
    }
}

impl CtlCommand {
    pub fn into_request(self) -> Result<Request> {
        Ok(match self {
            CtlCommand::Status => Request::Status,
            CtlCommand::Get { id } => Request::Get { id },
            CtlCommand::Add { bot, start } => Request::Add {
                bot: bot.to_config()?,
                start,
            },
            CtlCommand::Update { bot } => Request::Update {
                bot: bot.to_config()?,
            },
            CtlCommand::Delete { id } => Request::Delete { id },
            CtlCommand::Start { id } => Request::Start { id },
            CtlCommand::Stop { id } => Request::Stop { id },
            CtlCommand::Restart { id } => Request::Restart { id },
            CtlCommand::Logs { id } => Request::Logs { id },
        })
    }
}

/// Render a successful response for the terminal.
pub fn render(response: &Response) -> Result<String> {
    if let Some(bots) = &response.bots {
        if bots.is_empty() {
            return Ok("No bots configured.".to_string());
        }
        let mut out = format!("{:<24} {:<9} {:<10} {:<8} {}", "ID", "STATE", "KIND", "ENABLED", "MESSAGE");
        for bot in bots {
            out.push('\n');
            out.push_str(&format!(
                "{:<24} {:<9} {:<10} {:<8} {}",
                bot.id,
                bot.status.as_str(),
                bot.kind,
                if bot.enabled { "yes" } else { "no" },
                bot.status_msg
            ));
        }
        return Ok(out);
    }
    if let Some(bot) = &response.bot {
        return Ok(serde_json::to_string_pretty(bot)?);
    }
    if let Some(logs) = &response.logs {
        return Ok(logs.join("\n"));
    }
    if let Some(outcome) = response.outcome {
        return Ok(match outcome {
            StopOutcome::Stopped => "stopped",
            StopOutcome::AlreadyStopped => "already stopped",
            StopOutcome::TimedOut => "stop timed out; the bot is still shutting down",
        }
        .to_string());
    }
    Ok("ok".to_string())
}

pub async fn run_ctl(config_path: Option<PathBuf>, command: CtlCommand) -> Result<()> {
    let settings = Settings::load(config_path).context("loading settings")?;
    let request = command.into_request()?;
    let response = send_request(&settings.socket_path(), &request).await?;

    if !response.success {
        return Err(anyhow!(response
            .error
            .unwrap_or_else(|| "unknown error".to_string())));
    }
    println!("{}", render(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use botfleet_core::{LifecycleState, StatusSnapshot};
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: CtlCommand,
    }

    fn parse(args: &[&str]) -> CtlCommand {
        TestCli::try_parse_from(std::iter::once("ctl").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_add_builds_process_params() {
        let cmd = parse(&[
            "add",
            "document-bot",
            "--command",
            "doc-bot",
            "--arg",
            "--verbose",
            "--env",
            "TELEGRAM_TOKEN=1:abc",
            "--enabled",
            "--start",
        ]);
        let request = cmd.into_request().unwrap();
        let Request::Add { bot, start } = request else {
            panic!("expected add request");
        };
        assert!(start);
        assert!(bot.enabled);
        assert_eq!(bot.kind, "process");
        assert_eq!(bot.name, "document-bot");
        assert_eq!(bot.params["command"], "doc-bot");
        assert_eq!(bot.params["args"][0], "--verbose");
        assert_eq!(bot.params["env"]["TELEGRAM_TOKEN"], "1:abc");
    }

    #[test]
    fn test_raw_params_and_name() {
        let cmd = parse(&[
            "update",
            "link-bot",
            "--kind",
            "custom",
            "--name",
            "Links",
            "--params",
            r#"{"chat": 42}"#,
        ]);
        let Request::Update { bot } = cmd.into_request().unwrap() else {
            panic!("expected update request");
        };
        assert_eq!(bot.kind, "custom");
        assert_eq!(bot.name, "Links");
        assert_eq!(bot.params["chat"], 42);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let cmd = parse(&["add", "bad id", "--command", "x"]);
        assert!(cmd.into_request().is_err());

        let cmd = parse(&["add", "ok", "--params", "{nope"]);
        assert!(cmd.into_request().is_err());

        assert!(TestCli::try_parse_from(["ctl", "add", "x", "--env", "NOEQUALS"]).is_err());
    }

    #[test]
    fn test_render_status_table() {
        let response = Response {
            bots: Some(vec![StatusSnapshot {
                id: "document-bot".into(),
                name: "Documents".into(),
                kind: "process".into(),
                status: LifecycleState::Error,
                status_msg: "process exited with code 1".into(),
                enabled: true,
            }]),
            ..Response::ok()
        };
        let out = render(&response).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("document-bot"));
        assert!(lines[1].contains("error"));
        assert!(lines[1].ends_with("process exited with code 1"));
    }

    #[test]
    fn test_render_simple_payloads() {
        assert_eq!(render(&Response::ok()).unwrap(), "ok");
        let response = Response {
            bots: Some(Vec::new()),
            ..Response::ok()
        };
        assert_eq!(render(&response).unwrap(), "No bots configured.");
        let response = Response {
            outcome: Some(StopOutcome::AlreadyStopped),
            ..Response::ok()
        };
        assert_eq!(render(&response).unwrap(), "already stopped");
        let response = Response {
            logs: Some(vec!["a".into(), "b".into()]),
            ..Response::ok()
        };
        assert_eq!(render(&response).unwrap(), "a\nb");
    }
}
