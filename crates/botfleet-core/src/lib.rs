// ABOUTME: Shared types and configuration for botfleet.
// ABOUTME: Contains worker configs, lifecycle states, error types, the store trait, and settings.

pub mod error;
pub mod settings;
pub mod store;
pub mod types;

pub use error::{ConfigError, FleetError, Result, StoreError};
pub use settings::{Settings, SupervisorSettings};
pub use store::ConfigStore;
pub use types::{LifecycleState, StatusSnapshot, WorkerConfig};
