// ABOUTME: Worker configuration records and lifecycle state types.
// ABOUTME: WorkerConfig is owned by the store; LifecycleState and StatusSnapshot describe runtime state.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persistent configuration for one supervised bot.
///
/// `params` is opaque to the supervisor: it is handed to the worker body of
/// the matching `kind` on every (re)start.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Unique bot identity, used as the registry key.
    pub id: String,
    /// Human-readable name shown in status listings.
    #[serde(default)]
    pub name: String,
    /// Worker kind, selects the body from the catalog (e.g. "process").
    pub kind: String,
    /// Kind-specific parameters.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Whether the bot is started when the fleet loads.
    #[serde(default)]
    pub enabled: bool,
    /// Set by the store on first insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the store on every upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkerConfig {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind: kind.into(),
            params: serde_json::Value::Null,
            enabled: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Check the fields the supervisor relies on.
    ///
    /// Ids are used in log prefixes and socket commands, so they are limited
    /// to ASCII alphanumerics, `-` and `_`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::Invalid("bot id is required".into()));
        }
        if !self
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "bot id {:?} may only contain letters, digits, '-' and '_'",
                self.id
            )));
        }
        if self.kind.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "bot {:?} has no kind",
                self.id
            )));
        }
        Ok(())
    }
}

// Params routinely carry bot tokens, so Debug only lists their keys.
impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = match &self.params {
            serde_json::Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        f.debug_struct("WorkerConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &params)
            .field("enabled", &self.enabled)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Lifecycle state of a worker controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No run-loop is alive.
    #[default]
    Stopped,
    /// A run-loop was spawned but has not invoked the body yet.
    Starting,
    /// The worker body is executing.
    Running,
    /// The body exited on its own; the run-loop is waiting out the backoff.
    Error,
}

impl LifecycleState {
    /// True for the states in which `start` is refused.
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one registered bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: LifecycleState,
    pub status_msg: String,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_defaults_name_to_id() {
        let cfg = WorkerConfig::new("news-bot", "process");
        assert_eq!(cfg.name, "news-bot");
        assert_eq!(cfg.kind, "process");
        assert!(!cfg.enabled);
        assert!(cfg.params.is_null());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let cfg = WorkerConfig::new("", "process");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("id is required"));
    }

    #[test]
    fn test_validate_rejects_bad_id_chars() {
        let cfg = WorkerConfig::new("bad id/../x", "process");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_kind() {
        let cfg = WorkerConfig::new("bot_1", "");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("no kind"));
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let cfg = WorkerConfig::new("link-bot_2", "process");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_param_values() {
        let cfg = WorkerConfig::new("tg", "process")
            .with_params(json!({"token": "123456:SECRET", "channel_id": -100}));
        let debug = format!("{:?}", cfg);
        assert!(debug.contains("token"));
        assert!(!debug.contains("SECRET"));
        assert!(!debug.contains("-100"));
    }

    #[test]
    fn test_config_json_shape() {
        let json = r#"{"id":"doc","kind":"process","params":{"command":"true"}}"#;
        let cfg: WorkerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.id, "doc");
        assert_eq!(cfg.name, "");
        assert!(!cfg.enabled);
        assert_eq!(cfg.params["command"], "true");

        let out = serde_json::to_value(&cfg).unwrap();
        assert!(out.get("created_at").is_none());
    }

    #[test]
    fn test_lifecycle_state_active() {
        assert!(LifecycleState::Starting.is_active());
        assert!(LifecycleState::Running.is_active());
        assert!(!LifecycleState::Stopped.is_active());
        assert!(!LifecycleState::Error.is_active());
    }

    #[test]
    fn test_lifecycle_state_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&LifecycleState::Running).unwrap(),
            "\"running\""
        );
        let state: LifecycleState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(state, LifecycleState::Error);
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
