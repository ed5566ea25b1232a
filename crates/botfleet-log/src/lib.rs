// ABOUTME: Shared tracing setup for the botfleet daemon and control client
// ABOUTME: init() logs to stderr, init_for() scopes INFO to one crate, init_file() logs to disk

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Target used for lines emitted by supervised workers.
pub const WORKER_TARGET: &str = "botfleet::worker";

/// Daemon logging to stderr. Default: INFO level, RUST_LOG override.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Crate-filtered logging to stderr. INFO for the named crate and for worker
/// output, WARN for everything else. Used by the control client so sqlx and
/// tokio chatter stays out of command output.
pub fn init_for(crate_name: &str) {
    let mut filter = EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into());
    for directive in [format!("{crate_name}=info"), format!("{WORKER_TARGET}=info")] {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Warning: ignoring log directive {directive:?}: {e}"),
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// File-based logging. Default: INFO level, RUST_LOG override.
/// Logs to ~/.config/botfleet/{app_name}.log
/// If setup fails, prints a warning to stderr and falls back to stderr logging.
pub fn init_file(app_name: &str) {
    if let Err(e) = init_file_inner(app_name) {
        eprintln!("Warning: failed to set up file logging: {e}");
        init();
    }
}

/// Directory holding botfleet log files.
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("botfleet"))
}

fn init_file_inner(app_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_dir().ok_or("could not determine config directory")?;
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(format!("{app_name}.log")))?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_ansi(false)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn exports_init() {
        let _ = super::init as fn();
    }

    #[test]
    fn exports_init_for() {
        let _ = super::init_for as fn(&str);
    }

    #[test]
    fn exports_init_file() {
        let _ = super::init_file as fn(&str);
    }

    #[test]
    fn log_dir_is_namespaced() {
        if let Some(dir) = super::log_dir() {
            assert!(dir.ends_with("botfleet"));
        }
    }

    #[test]
    fn worker_target_is_a_valid_directive() {
        let directive = format!("{}=info", super::WORKER_TARGET);
        assert!(directive
            .parse::<tracing_subscriber::filter::Directive>()
            .is_ok());
    }
}
