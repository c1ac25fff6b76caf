//! Process-shared capacity limiter (spec §4.6): a map from workload type to
//! a cooperative semaphore bounding RAM/LLM parallelism across every
//! in-process worker loop. A limit of `0` means unlimited.

use std::collections::HashMap;
use std::sync::Arc;

use ragcore_ingestion::WorkloadType;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A held permit, or `None` for an unlimited workload type. Dropping it
/// releases the slot — the guaranteed-release scope the spec requires.
pub enum Permit {
    Limited(OwnedSemaphorePermit),
    Unlimited,
}

pub struct CapacityLimiter {
    semaphores: HashMap<WorkloadType, Arc<Semaphore>>,
}

impl CapacityLimiter {
    /// `limits` gives a concurrency cap per workload type; types absent from
    /// the map (or mapped to `0`) are unlimited.
    pub fn new(limits: HashMap<WorkloadType, usize>) -> Self {
        let semaphores = limits
            .into_iter()
            .filter(|(_, limit)| *limit > 0)
            .map(|(workload, limit)| (workload, Arc::new(Semaphore::new(limit))))
            .collect();
        Self { semaphores }
    }

    /// Non-blocking; returns `None` if the workload type is at capacity.
    pub fn try_acquire(&self, workload: WorkloadType) -> Option<Permit> {
        match self.semaphores.get(&workload) {
            None => Some(Permit::Unlimited),
            Some(sem) => sem.clone().try_acquire_owned().ok().map(Permit::Limited),
        }
    }
}
