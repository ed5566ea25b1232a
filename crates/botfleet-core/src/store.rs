// ABOUTME: Persistence boundary for worker configs.
// ABOUTME: The registry writes through a ConfigStore before touching in-memory state.

use crate::error::StoreError;
use crate::types::WorkerConfig;
use async_trait::async_trait;

/// Durable source of truth for bot configurations.
///
/// Implementations must make `upsert` idempotent and keyed by `id`.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All stored configs, oldest first.
    async fn list_all(&self) -> Result<Vec<WorkerConfig>, StoreError>;

    /// A single config, or `StoreError::NotFound`.
    async fn get(&self, id: &str) -> Result<WorkerConfig, StoreError>;

    /// Insert or replace the config with `config.id`.
    async fn upsert(&self, config: &WorkerConfig) -> Result<(), StoreError>;

    /// Remove a config; `StoreError::NotFound` when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
