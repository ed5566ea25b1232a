// ABOUTME: botfleet CLI entry point.
// ABOUTME: Provides init, serve, and ctl subcommands.

use botfleet::{run_ctl, run_init, run_serve, CtlCommand, ServeOptions};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "botfleet")]
#[command(about = "Supervisor for a fleet of long-running bots")]
struct Cli {
    /// Path to settings file
    #[arg(long, global = true, env = "BOTFLEET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the supervisor daemon
    Serve {
        /// Log to ~/.config/botfleet/botfleet.log instead of stderr
        #[arg(long)]
        log_file: bool,
    },
    /// Send a command to a running daemon
    Ctl {
        #[command(subcommand)]
        command: CtlCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            botfleet_log::init_for("botfleet");
            run_init(cli.config, force)
        }
        Commands::Serve { log_file } => {
            if log_file {
                botfleet_log::init_file("botfleet");
            } else {
                botfleet_log::init();
            }
            run_serve(ServeOptions {
                config_path: cli.config,
            })
            .await
        }
        Commands::Ctl { command } => {
            botfleet_log::init_for("botfleet");
            run_ctl(cli.config, command).await
        }
    }
}
