// ABOUTME: Worker body trait and the kind → body catalog.
// ABOUTME: A body runs until its cancellation token fires or it fails; the controller restarts it.

use crate::log_buffer::LogSink;
use anyhow::Result;
use async_trait::async_trait;
use botfleet_core::WorkerConfig;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a worker body receives for one run.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Fires when the controller is stopping. Bodies must watch it to exit promptly.
    pub cancel: CancellationToken,
    /// Config snapshot taken at the top of this iteration.
    pub config: WorkerConfig,
    /// Destination for the worker's log lines.
    pub log: LogSink,
}

/// The business logic of one worker kind.
///
/// `run` should only return once cancellation is observed or the worker hits
/// a condition it cannot recover from. Returning (Ok or Err) without
/// cancellation counts as a crash and schedules a restart after the backoff.
/// Clients a body needs (HTTP, storage, ...) are held by the implementing type.
#[async_trait]
pub trait WorkerBody: Send + Sync {
    async fn run(&self, ctx: WorkerContext) -> Result<()>;
}

/// Adapter turning an async closure into a WorkerBody.
pub struct FnWorker<F> {
    f: F,
}

/// Wrap an async closure as a worker body.
pub fn from_fn<F, Fut>(f: F) -> FnWorker<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnWorker { f }
}

#[async_trait]
impl<F, Fut> WorkerBody for FnWorker<F>
where
    F: Fn(WorkerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn run(&self, ctx: WorkerContext) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Maps worker kind names to their bodies.
#[derive(Clone, Default)]
pub struct WorkerCatalog {
    bodies: HashMap<String, Arc<dyn WorkerBody>>,
}

impl WorkerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a body for a kind, replacing any previous registration.
    pub fn register<B: WorkerBody + 'static>(&mut self, kind: impl Into<String>, body: B) {
        self.bodies.insert(kind.into(), Arc::new(body));
    }

    /// Builder form of `register`.
    pub fn with<B: WorkerBody + 'static>(mut self, kind: impl Into<String>, body: B) -> Self {
        self.register(kind, body);
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn WorkerBody>> {
        self.bodies.get(kind).cloned()
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.bodies.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for WorkerCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerCatalog")
            .field("kinds", &self.kinds())
            .finish()
    }
}
