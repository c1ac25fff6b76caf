//! Worker Runtime (C5, spec §4.6): a generic consumer loop shared by every
//! queue-backed workload — round-robin polling, a process-shared capacity
//! limiter, heartbeats for long jobs, and cooperative graceful shutdown.
//! Grounded on the teacher's `apps/copilot-server` top-level entrypoint
//! shape (`Args`/`App`/`init_telemetry` composition), since the teacher has
//! no direct queue-worker analogue.

pub mod dispatch;
pub mod handlers;
pub mod heartbeat;
pub mod limiter;
pub mod runtime;
pub mod shutdown;

pub use dispatch::{DispatchTable, JobHandler};
pub use handlers::{IngestionEmbedHandler, IngestionOcrHandler, ProfilingHandler};
pub use heartbeat::{HeartbeatHandle, HeartbeatTarget};
pub use limiter::{CapacityLimiter, Permit};
pub use runtime::WorkerRuntime;
pub use shutdown::{install as install_shutdown_signal, ShutdownSignal};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("job handler failed: {0}")]
    HandlerFailed(String),
    #[error(transparent)]
    Queue(#[from] ragcore_infra::QueueError),
    #[error(transparent)]
    Ingestion(#[from] ragcore_ingestion::IngestionError),
    #[error(transparent)]
    Profiling(#[from] ragcore_profiling::ProfilingError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
