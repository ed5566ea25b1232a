// ABOUTME: Per-bot lifecycle controller: start/stop, crash-restart backoff, log capture.
// ABOUTME: Each active controller owns exactly one run-loop task at a time.

use crate::log_buffer::{LogBuffer, LogSink};
use crate::worker::{WorkerCatalog, WorkerContext};
use anyhow::anyhow;
use botfleet_core::{FleetError, LifecycleState, Result, StatusSnapshot, SupervisorSettings, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a `stop` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The run-loop finished within the stop timeout.
    Stopped,
    /// There was no run-loop to stop.
    AlreadyStopped,
    /// The body ignored cancellation past the stop timeout. Its task is left
    /// running detached and the controller stays active until it returns.
    TimedOut,
}

/// Handles for the run-loop that is currently alive.
#[derive(Clone)]
struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
    /// Fires when the run-loop task exits, however it exits.
    done: CancellationToken,
    /// Cuts the crash backoff short when `start` is called during it.
    retry_now: Arc<Notify>,
}

struct Inner {
    config: WorkerConfig,
    state: LifecycleState,
    message: String,
    /// Present iff a run-loop task is alive.
    run: Option<ActiveRun>,
    next_generation: u64,
    /// Set once the bot is deleted. A retired controller never starts again.
    retired: bool,
}

/// Supervises a single bot.
pub struct WorkerController {
    id: String,
    inner: Mutex<Inner>,
    logs: Arc<LogBuffer>,
    catalog: Arc<WorkerCatalog>,
    settings: SupervisorSettings,
    state_tx: watch::Sender<LifecycleState>,
}

impl WorkerController {
    /// Create a stopped controller for `config`.
    pub fn new(
        config: WorkerConfig,
        catalog: Arc<WorkerCatalog>,
        settings: SupervisorSettings,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(LifecycleState::Stopped);
        Arc::new(Self {
            id: config.id.clone(),
            inner: Mutex::new(Inner {
                config,
                state: LifecycleState::Stopped,
                message: String::new(),
                run: None,
                next_generation: 0,
                retired: false,
            }),
            logs: Arc::new(LogBuffer::new(settings.log_capacity)),
            catalog,
            settings,
            state_tx,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change state while holding the lock so watchers see transitions in order.
    fn transition(&self, inner: &mut Inner, state: LifecycleState, message: String) {
        inner.state = state;
        inner.message = message;
        self.state_tx.send_replace(state);
    }

    fn sink(&self) -> LogSink {
        LogSink::new(&self.id, Arc::clone(&self.logs))
    }

    /// Launch the run-loop. Returns as soon as the loop is scheduled.
    ///
    /// Calling this while the worker sits in crash backoff skips the rest of
    /// the backoff instead of spawning a second loop.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut inner = self.lock();
        if inner.retired {
            return Err(FleetError::NotFound(self.id.clone()));
        }
        if inner.state.is_active() {
            return Err(FleetError::AlreadyActive {
                id: self.id.clone(),
                state: inner.state,
            });
        }

        if let Some(run) = inner.run.clone() {
            if run.cancel.is_cancelled() {
                // A stop timed out and the old loop has not exited yet.
                return Err(FleetError::AlreadyActive {
                    id: self.id.clone(),
                    state: inner.state,
                });
            }
            run.retry_now.notify_one();
            self.transition(&mut inner, LifecycleState::Starting, String::new());
            info!(worker = %self.id, "Retrying worker before backoff elapsed");
            return Ok(());
        }

        let run = ActiveRun {
            generation: inner.next_generation,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
            retry_now: Arc::new(Notify::new()),
        };
        inner.next_generation += 1;
        inner.run = Some(run.clone());
        self.transition(&mut inner, LifecycleState::Starting, String::new());
        drop(inner);

        info!(worker = %self.id, kind = %self.config().kind, "Starting worker");
        tokio::spawn(Arc::clone(self).run_loop(run));
        Ok(())
    }

    async fn run_loop(self: Arc<Self>, run: ActiveRun) {
        let _done = run.done.clone().drop_guard();
        let backoff = self.settings.restart_backoff();

        loop {
            if run.cancel.is_cancelled() {
                break;
            }

            let config = {
                let mut inner = self.lock();
                self.transition(&mut inner, LifecycleState::Running, String::new());
                inner.config.clone()
            };

            let result = self.invoke(config, run.cancel.clone()).await;
            if run.cancel.is_cancelled() {
                break;
            }

            let message = match &result {
                Ok(()) => String::new(),
                Err(e) => format!("{e:#}"),
            };
            {
                let mut inner = self.lock();
                self.transition(&mut inner, LifecycleState::Error, message.clone());
            }
            let reason = if message.is_empty() {
                "no error"
            } else {
                message.as_str()
            };
            self.sink().line(format!(
                "worker exited ({reason}), restarting in {}s",
                backoff.as_secs()
            ));
            warn!(worker = %self.id, error = %reason, backoff_secs = backoff.as_secs(), "Worker exited, scheduling restart");

            tokio::select! {
                _ = run.cancel.cancelled() => break,
                _ = run.retry_now.notified() => {}
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        let mut inner = self.lock();
        if inner
            .run
            .as_ref()
            .is_some_and(|current| current.generation == run.generation)
        {
            inner.run = None;
            self.transition(&mut inner, LifecycleState::Stopped, String::new());
        }
        drop(inner);
        info!(worker = %self.id, "Worker stopped");
    }

    /// Run the body for one iteration in its own task so a panic becomes a
    /// worker failure rather than taking the run-loop down.
    async fn invoke(&self, config: WorkerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
        let Some(body) = self.catalog.get(&config.kind) else {
            anyhow::bail!("no worker registered for kind {:?}", config.kind);
        };
        let ctx = WorkerContext {
            cancel,
            config,
            log: self.sink(),
        };

        match tokio::spawn(async move { body.run(ctx).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(anyhow!("worker panicked: {}", panic_message(e.into_panic()))),
            Err(e) => Err(anyhow!("worker task failed: {e}")),
        }
    }

    /// Cancel the run-loop and wait for it to finish, up to the stop timeout.
    ///
    /// Never fails. Safe to call concurrently and repeatedly.
    pub async fn stop(&self) -> StopOutcome {
        let run = self.lock().run.clone();
        let Some(run) = run else {
            return StopOutcome::AlreadyStopped;
        };

        debug!(worker = %self.id, "Stopping worker");
        run.cancel.cancel();

        let limit = self.settings.stop_timeout();
        match tokio::time::timeout(limit, run.done.cancelled()).await {
            Ok(()) => StopOutcome::Stopped,
            Err(_) => {
                warn!(
                    worker = %self.id,
                    timeout_secs = limit.as_secs(),
                    "Worker ignored cancellation; leaving it running detached"
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Refuse every later `start`, then stop whatever run is alive.
    pub async fn retire(&self) -> StopOutcome {
        self.lock().retired = true;
        self.stop().await
    }

    pub fn status(&self) -> LifecycleState {
        self.lock().state
    }

    /// Error text from the last failed run; empty unless the state is Error.
    pub fn status_message(&self) -> String {
        self.lock().message.clone()
    }

    /// Replace the cached config. A running body keeps its snapshot; the next
    /// iteration of the run-loop picks up the new one.
    pub fn update_config(&self, config: WorkerConfig) {
        self.lock().config = config;
    }

    pub fn config(&self) -> WorkerConfig {
        self.lock().config.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            id: self.id.clone(),
            name: inner.config.name.clone(),
            kind: inner.config.kind.clone(),
            status: inner.state,
            status_msg: inner.message.clone(),
            enabled: inner.config.enabled,
        }
    }

    /// Snapshot of the captured log lines, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.logs.lines()
    }

    /// Watch lifecycle transitions. Only the latest state is retained.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// True while a run-loop task exists, including one left behind by a timed-out stop.
    pub fn is_alive(&self) -> bool {
        self.lock().run.is_some()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
