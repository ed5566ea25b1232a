// ABOUTME: Worker supervision subsystem for botfleet.
// ABOUTME: Exposes the FleetRegistry entry point plus the controller, log buffer, and worker traits.

pub mod controller;
pub mod log_buffer;
pub mod process;
pub mod registry;
pub mod worker;

pub use controller::{StopOutcome, WorkerController};
pub use log_buffer::{LogBuffer, LogSink};
pub use process::{ProcessParams, ProcessWorker};
pub use registry::FleetRegistry;
pub use worker::{from_fn, FnWorker, WorkerBody, WorkerCatalog, WorkerContext};

/// Re-exported so worker bodies can name the cancellation type without
/// depending on tokio-util directly.
pub use tokio_util::sync::CancellationToken;
