//! The per-worker consumer loop (spec §4.6 steps 1-6).

use std::sync::Arc;
use std::time::Duration;

use ragcore_core::models::Job;
use ragcore_ingestion::WorkloadType;
use ragcore_infra::Queue;
use tracing::{debug, error, warn};

use crate::dispatch::DispatchTable;
use crate::limiter::CapacityLimiter;
use crate::shutdown::ShutdownSignal;

fn workload_for_queue(queue_name: &str) -> Option<WorkloadType> {
    const ALL: [WorkloadType; 6] = [
        WorkloadType::Ingestion,
        WorkloadType::IngestionOcr,
        WorkloadType::IngestionEmbed,
        WorkloadType::LlmWorkflow,
        WorkloadType::Maintenance,
        WorkloadType::Profiling,
    ];
    ALL.into_iter().find(|w| w.queue_name() == queue_name)
}

pub struct WorkerRuntime {
    queue_names: Vec<String>,
    queue: Arc<dyn Queue>,
    limiter: Arc<CapacityLimiter>,
    dispatch: DispatchTable,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    last_index: usize,
}

impl WorkerRuntime {
    pub fn new(
        queue_names: Vec<String>,
        queue: Arc<dyn Queue>,
        limiter: Arc<CapacityLimiter>,
        dispatch: DispatchTable,
        poll_interval: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self { queue_names, queue, limiter, dispatch, poll_interval, shutdown, last_index: 0 }
    }

    /// Runs until the shared shutdown signal fires, finishing whatever job
    /// is in flight first.
    pub async fn run(mut self) {
        let n = self.queue_names.len();
        if n == 0 {
            return;
        }
        while !self.shutdown.is_set() {
            self.last_index = (self.last_index + 1) % n;
            let queue_name = self.queue_names[self.last_index].clone();
            let processed = self.tick(&queue_name).await;
            if !processed {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        debug!("worker loop exiting on shutdown signal");
    }

    /// One round-robin step. Returns `true` if a job was dequeued (whether
    /// or not it ultimately succeeded), so the caller can skip the idle
    /// sleep.
    async fn tick(&self, queue_name: &str) -> bool {
        let Some(workload) = workload_for_queue(queue_name) else {
            warn!(queue_name, "no workload type mapped to this queue, skipping");
            return false;
        };

        let Some(permit) = self.limiter.try_acquire(workload) else {
            debug!(queue_name, "capacity limiter denied acquisition, skipping this tick");
            return false;
        };

        let job = match self.queue.dequeue(queue_name).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                drop(permit);
                return false;
            }
            Err(e) => {
                error!(queue_name, error = %e, "dequeue failed");
                drop(permit);
                return false;
            }
        };

        self.process(queue_name, job).await;
        drop(permit);
        true
    }

    async fn process(&self, queue_name: &str, job: Job) {
        let Some(handler) = self.dispatch.get(queue_name) else {
            warn!(queue_name, job_id = %job.id, "no handler registered for this queue, discarding job");
            let _ = self.queue.reject(&job, false).await;
            return;
        };

        match handler.handle(&job).await {
            Ok(()) => {
                if let Err(e) = self.queue.acknowledge(&job).await {
                    error!(job_id = %job.id, error = %e, "failed to acknowledge completed job");
                }
            }
            Err(e) => {
                let requeue = !job.attempts_exhausted();
                error!(job_id = %job.id, error = %e, requeue, "job handler failed");
                if let Err(e) = self.queue.reject(&job, requeue).await {
                    error!(job_id = %job.id, error = %e, "failed to reject job");
                }
            }
        }
    }
}
