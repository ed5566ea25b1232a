// ABOUTME: botfleet daemon library: serve, init, and control client modules.
// ABOUTME: run_serve wires settings, the SQLite store, the worker catalog, and the control socket.

pub mod ctl;
pub mod init;
pub mod socket;

pub use ctl::{run_ctl, CtlCommand};
pub use init::run_init;

use anyhow::{Context, Result};
use botfleet_core::Settings;
use botfleet_store::SqliteStore;
use botfleet_supervisor::{process, FleetRegistry, ProcessWorker, WorkerCatalog};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Options for running the daemon
pub struct ServeOptions {
    /// Path to the settings file
    pub config_path: Option<PathBuf>,
}

/// Worker kinds the daemon knows how to run.
pub fn build_catalog() -> WorkerCatalog {
    WorkerCatalog::new().with(process::KIND, ProcessWorker)
}

/// Run the daemon until Ctrl+C or SIGTERM, then stop every bot.
pub async fn run_serve(options: ServeOptions) -> Result<()> {
    let settings = Settings::load(options.config_path).context("loading settings")?;

    let db_path = settings.database_path();
    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("opening bot store at {}", db_path.display()))?;

    let registry = Arc::new(FleetRegistry::new(
        Arc::new(store),
        build_catalog(),
        settings.supervisor,
    ));
    let started = registry
        .load_and_start_all()
        .await
        .context("loading bots from the store")?;

    let socket_path = settings.socket_path();
    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn(socket::run_socket_server(
        socket_path.clone(),
        Arc::clone(&registry),
        shutdown.clone(),
    ));

    info!(
        bots = registry.len(),
        started,
        socket = %socket_path.display(),
        "botfleet serving"
    );
    println!(
        "botfleet running {} bot(s), {} started. Control socket: {}",
        registry.len(),
        started,
        socket_path.display()
    );

    let server_exit = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut server => Some(joined),
    };

    shutdown.cancel();
    registry.stop_all().await;

    match server_exit {
        Some(joined) => joined
            .context("control socket task panicked")?
            .context("control socket failed")?,
        None => {
            if let Err(e) = server.await {
                warn!(error = %e, "Control socket task ended abnormally");
            }
        }
    }

    info!("botfleet shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_process_kind() {
        let catalog = build_catalog();
        assert_eq!(catalog.kinds(), vec!["process"]);
    }
}
