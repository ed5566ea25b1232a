// ABOUTME: In-memory config store with the same semantics as the SQLite store.
// ABOUTME: Used by tests and by embedders that do not need durability.

use async_trait::async_trait;
use botfleet_core::{ConfigStore, StoreError, WorkerConfig};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Config store kept entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    bots: RwLock<HashMap<String, WorkerConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with configs, as if each was upserted.
    pub fn with_configs(configs: impl IntoIterator<Item = WorkerConfig>) -> Self {
        let now = Utc::now();
        let bots = configs
            .into_iter()
            .map(|mut cfg| {
                cfg.created_at.get_or_insert(now);
                cfg.updated_at = Some(now);
                (cfg.id.clone(), cfg)
            })
            .collect();
        Self {
            bots: RwLock::new(bots),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_all(&self) -> Result<Vec<WorkerConfig>, StoreError> {
        let bots = self.bots.read().await;
        let mut all: Vec<WorkerConfig> = bots.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get(&self, id: &str) -> Result<WorkerConfig, StoreError> {
        self.bots
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn upsert(&self, config: &WorkerConfig) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut bots = self.bots.write().await;
        let created_at = bots
            .get(&config.id)
            .and_then(|existing| existing.created_at)
            .unwrap_or(now);

        let mut stored = config.clone();
        stored.created_at = Some(created_at);
        stored.updated_at = Some(now);
        bots.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.bots.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}
