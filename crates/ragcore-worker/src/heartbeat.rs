//! Heartbeat for long jobs (spec §4.6: "for long jobs, e.g. plugin
//! executions and LLM profiling"). A background task periodically touches
//! the job's DB tracking record and extends the queue lease; the caller
//! aborts the task once the job finishes, success or failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ragcore_core::models::Job;
use ragcore_infra::Queue;
use tracing::warn;

/// The DB-side "touch `updated_at`" side of the heartbeat. Declared locally
/// so this crate doesn't depend on a specific tracking-record schema;
/// concrete adapters live with the stage handler that owns the record.
#[async_trait]
pub trait HeartbeatTarget: Send + Sync {
    async fn touch(&self);
}

pub struct HeartbeatHandle {
    task: tokio::task::JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Starts a task that, every `interval`, touches `target` and extends the
/// job's queue visibility by `extend_seconds`. Caller must call `.stop()`
/// when the job finishes — dropping the handle also aborts it, but calling
/// `stop()` explicitly keeps the guaranteed-release intent visible at the
/// call site.
pub fn spawn(
    queue: Arc<dyn Queue>,
    job: Job,
    target: Arc<dyn HeartbeatTarget>,
    interval: Duration,
    extend_seconds: u64,
) -> HeartbeatHandle {
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            target.touch().await;
            match queue.extend_visibility(&job, extend_seconds).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %job.id, "extend_visibility returned false, job may have been re-delivered");
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "heartbeat failed to extend visibility");
                }
            }
        }
    });
    HeartbeatHandle { task }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
