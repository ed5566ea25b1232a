// ABOUTME: Fleet registry: owns every WorkerController and persists config changes.
// ABOUTME: The only entry point the daemon's control surface talks to.

use crate::controller::{StopOutcome, WorkerController};
use crate::worker::WorkerCatalog;
use botfleet_core::{
    ConfigStore, FleetError, LifecycleState, Result, StatusSnapshot, StoreError,
    SupervisorSettings, WorkerConfig,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owns the id → controller map. The store is written before any in-memory
/// change, so the registry can always be rebuilt from the store.
pub struct FleetRegistry {
    store: Arc<dyn ConfigStore>,
    catalog: Arc<WorkerCatalog>,
    settings: SupervisorSettings,
    controllers: Mutex<HashMap<String, Arc<WorkerController>>>,
}

impl FleetRegistry {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        catalog: WorkerCatalog,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            store,
            catalog: Arc::new(catalog),
            settings,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<WorkerController>>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn controller(&self, id: &str) -> Result<Arc<WorkerController>> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(id.to_string()))
    }

    /// Create a controller for `config`, or refresh the cached config of the
    /// existing one without touching its lifecycle state.
    fn insert_or_refresh(&self, config: WorkerConfig) -> Arc<WorkerController> {
        let mut controllers = self.lock();
        if let Some(existing) = controllers.get(&config.id) {
            existing.update_config(config);
            return Arc::clone(existing);
        }
        let ctl = WorkerController::new(config, Arc::clone(&self.catalog), self.settings);
        controllers.insert(ctl.id().to_string(), Arc::clone(&ctl));
        ctl
    }

    /// Build controllers for every stored config and start the enabled ones.
    ///
    /// Returns how many were started. A failing start is logged and skipped.
    pub async fn load_and_start_all(&self) -> Result<usize> {
        let configs = self.store.list_all().await?;
        let total = configs.len();
        let mut started = 0;

        for config in configs {
            let enabled = config.enabled;
            let ctl = self.insert_or_refresh(config);
            if !enabled {
                continue;
            }
            match ctl.start() {
                Ok(()) => started += 1,
                Err(e) => warn!(worker = %ctl.id(), error = %e, "Failed to start bot during load"),
            }
        }

        info!(total, started, "Fleet loaded");
        Ok(started)
    }

    /// Stop every controller in parallel. Wall time is bounded by the slowest
    /// single stop, not the sum.
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        let controllers: Vec<Arc<WorkerController>> = self.lock().values().cloned().collect();
        let outcomes = join_all(controllers.iter().map(|ctl| async move {
            (ctl.id().to_string(), ctl.stop().await)
        }))
        .await;

        let timed_out = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == StopOutcome::TimedOut)
            .count();
        if timed_out > 0 {
            warn!(timed_out, "Some bots did not stop in time");
        }
        info!(count = outcomes.len(), "Fleet stopped");
        outcomes
    }

    /// Persist `config` and make sure a controller exists for it. An existing
    /// controller keeps its lifecycle state.
    pub async fn add_bot(&self, config: WorkerConfig) -> Result<()> {
        self.store.upsert(&config).await?;
        info!(worker = %config.id, kind = %config.kind, "Bot saved");
        self.insert_or_refresh(config);
        Ok(())
    }

    /// Persist a new config. A running bot is stopped first and restarted
    /// with the new config once it is saved.
    ///
    /// If the old body outlives the stop timeout the config is still saved,
    /// but the restart is skipped: the bot ends up stopped once that body
    /// returns.
    pub async fn update_bot(&self, config: WorkerConfig) -> Result<()> {
        let existing = self.lock().get(&config.id).cloned();
        let Some(ctl) = existing else {
            return self.add_bot(config).await;
        };

        let was_running = ctl.is_alive();
        if was_running && ctl.stop().await == StopOutcome::TimedOut {
            warn!(worker = %ctl.id(), "Old run did not stop in time; saving update without restart");
        }

        if let Err(e) = self.store.upsert(&config).await {
            if was_running {
                if let Err(start_err) = ctl.start() {
                    warn!(worker = %ctl.id(), error = %start_err, "Failed to resume bot after failed update");
                }
            }
            return Err(e.into());
        }

        ctl.update_config(config);
        info!(worker = %ctl.id(), restart = was_running, "Bot updated");
        if was_running {
            match ctl.start() {
                Ok(()) => {}
                // Still draining a timed-out run, or started by someone else
                // meanwhile. Either way the saved config is what it runs next.
                Err(FleetError::AlreadyActive { state, .. }) => {
                    debug!(worker = %ctl.id(), %state, "Bot already active after update");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Stop the bot, delete its stored config, then drop the controller.
    ///
    /// If the store delete fails the controller stays registered (stopped).
    /// Once removed, the controller is retired so a `start` that raced the
    /// store delete cannot leave a body running unowned.
    pub async fn delete_bot(&self, id: &str) -> Result<()> {
        let ctl = self.controller(id)?;
        ctl.stop().await;

        match self.store.delete(id).await {
            Ok(()) => {}
            // Already gone from the store; only the cache is left to clean up.
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        {
            let mut controllers = self.lock();
            if controllers
                .get(id)
                .is_some_and(|current| Arc::ptr_eq(current, &ctl))
            {
                controllers.remove(id);
            }
        }
        if ctl.retire().await == StopOutcome::Stopped {
            debug!(worker = %id, "Stopped a run started during delete");
        }

        info!(worker = %id, "Bot deleted");
        Ok(())
    }

    pub fn start(&self, id: &str) -> Result<()> {
        self.controller(id)?.start()
    }

    pub async fn stop(&self, id: &str) -> Result<StopOutcome> {
        let ctl = self.controller(id)?;
        Ok(ctl.stop().await)
    }

    /// Stop then start.
    pub async fn restart(&self, id: &str) -> Result<()> {
        let ctl = self.controller(id)?;
        ctl.stop().await;
        ctl.start()
    }

    /// One snapshot per registered bot, sorted by id.
    pub fn status(&self) -> Vec<StatusSnapshot> {
        let controllers: Vec<Arc<WorkerController>> = self.lock().values().cloned().collect();
        let mut snapshots: Vec<StatusSnapshot> =
            controllers.iter().map(|ctl| ctl.snapshot()).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    pub fn state(&self, id: &str) -> Result<LifecycleState> {
        Ok(self.controller(id)?.status())
    }

    pub fn logs(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.controller(id)?.logs())
    }

    /// Read a config straight from the store.
    pub async fn get(&self, id: &str) -> Result<WorkerConfig> {
        self.store.get(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => FleetError::NotFound(id),
            other => FleetError::Store(other),
        })
    }

    pub fn subscribe(&self, id: &str) -> Result<watch::Receiver<LifecycleState>> {
        Ok(self.controller(id)?.subscribe())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
