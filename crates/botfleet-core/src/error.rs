// ABOUTME: Error types for botfleet.
// ABOUTME: StoreError for persistence, FleetError for registry calls, ConfigError for settings.

use crate::types::LifecycleState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a config store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the id.
    #[error("bot {0:?} not found")]
    NotFound(String),

    /// The backend failed (connection, query, IO).
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("corrupt record for bot {id:?}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Errors returned synchronously by registry and controller operations.
///
/// Worker body failures never show up here; they only change a controller's
/// state and status message.
#[derive(Error, Debug)]
pub enum FleetError {
    /// No controller is registered for the id.
    #[error("bot {0:?} not found")]
    NotFound(String),

    /// `start` was called while the controller is starting or running.
    #[error("bot {id:?} is already {state}")]
    AlreadyActive { id: String, state: LifecycleState },

    /// Persisting a change failed; in-memory state was left untouched.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors while loading settings or validating a worker config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type alias using FleetError.
pub type Result<T> = std::result::Result<T, FleetError>;
