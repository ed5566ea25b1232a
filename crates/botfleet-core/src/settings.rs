// ABOUTME: Daemon settings for botfleet, loaded from a TOML file.
// ABOUTME: Supports ${VAR} expansion, ~ in paths, and defaults for supervisor timing.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Top-level settings for the botfleet daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database holding bot configs (e.g. "~/.config/botfleet/fleet.db").
    #[serde(default = "default_database")]
    pub database: String,

    /// Control socket path. Defaults to botfleet.sock in the temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

/// Timing and capacity knobs for worker controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// How long `stop` waits for a run-loop to finish.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Delay between a worker exiting on its own and the restart.
    #[serde(default = "default_restart_backoff_secs")]
    pub restart_backoff_secs: u64,

    /// Lines kept per worker log buffer.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

fn default_database() -> String {
    "~/.config/botfleet/fleet.db".to_string()
}

fn default_stop_timeout_secs() -> u64 {
    70
}

fn default_restart_backoff_secs() -> u64 {
    10
}

fn default_log_capacity() -> usize {
    200
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            stop_timeout_secs: default_stop_timeout_secs(),
            restart_backoff_secs: default_restart_backoff_secs(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl SupervisorSettings {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: default_database(),
            socket: None,
            supervisor: SupervisorSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the given path or the default location.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file at an explicit path is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let path = match path {
            Some(p) => p,
            None => Self::default_path()?,
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse settings from TOML text, expanding ${VAR} references first.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let contents = shellexpand::env_with_context_no_errors(contents, |var: &str| {
            match std::env::var(var) {
                Ok(val) => Some(val),
                Err(_) => {
                    warn!(
                        variable = %var,
                        "Environment variable not defined, using empty string"
                    );
                    Some(String::new())
                }
            }
        });

        let settings: Settings =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default settings path (~/.config/botfleet/botfleet.toml).
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(dirs::config_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("botfleet").join("botfleet.toml"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("database path is required".into()));
        }
        if self.supervisor.log_capacity == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.log_capacity must be positive".into(),
            ));
        }
        if self.supervisor.stop_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "supervisor.stop_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Database path with ~ expanded.
    pub fn database_path(&self) -> PathBuf {
        shellexpand::tilde(&self.database).into_owned().into()
    }

    /// Control socket path with ~ expanded.
    pub fn socket_path(&self) -> PathBuf {
        match &self.socket {
            Some(path) => shellexpand::tilde(path).into_owned().into(),
            None => std::env::temp_dir().join("botfleet.sock"),
        }
    }
}
