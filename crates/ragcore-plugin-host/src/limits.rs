//! Request-size / concurrency guard on the plugin host (SPEC_FULL §6.1,
//! `backend/src/shu/plugins/request_limits.py`): caps the number of
//! concurrent capability calls a single plugin execution may have in
//! flight, and the maximum page size a `kb.search_*` call may request.
//! Mirrors the teacher's bulkhead shape: a semaphore sized per call site,
//! acquired for the duration of one capability invocation.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::CapabilityError;

pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 10;
pub const MAX_SEARCH_PAGE_SIZE: usize = 100;

/// One bulkhead per in-flight plugin execution; construct fresh per
/// execution so one plugin's concurrency never borrows from another's.
pub struct RequestLimiter {
    semaphore: Arc<Semaphore>,
}

impl RequestLimiter {
    pub fn new(max_concurrent_calls: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent_calls.max(1))) }
    }

    /// Acquires a permit for the duration of one capability call. The
    /// semaphore is never closed, so `acquire_owned` only fails if the
    /// limiter itself has been dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, CapabilityError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CapabilityError::not_permitted("request limiter is shutting down"))
    }
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_CALLS)
    }
}

/// Rejects a requested page size above the ceiling before it reaches the
/// search evaluator, instead of letting one plugin request an unbounded page.
pub fn check_page_size(requested: usize) -> Result<(), CapabilityError> {
    if requested > MAX_SEARCH_PAGE_SIZE {
        return Err(CapabilityError::not_permitted(format!(
            "page size {requested} exceeds the maximum of {MAX_SEARCH_PAGE_SIZE}"
        )));
    }
    Ok(())
}
