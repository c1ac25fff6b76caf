//! Queue Backend (C2, spec §4.2): durable FIFO queues with competing
//! consumer delivery, visibility timeouts, and bounded retry. Two
//! implementations satisfy the same contract, parallel to C1.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use ragcore_core::config::QueueConfig;
use ragcore_core::models::Job;
use thiserror::Error;

pub use memory::MemoryQueue;
pub use redis::RedisQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue connection failure: {0}")]
    ConnectionFailure(String),
    #[error("queue operation failed: {0}")]
    OperationFailed(String),
    #[error("job serialization failed: {0}")]
    Serialization(String),
}

/// The queue contract (spec §4.2). `dequeue` leases the head job for
/// `visibility_timeout_seconds`; `extend_visibility` prolongs a lease held
/// by the current consumer and returns `false` if it has already expired
/// (meaning the job may have been re-delivered elsewhere).
#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;
    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>, QueueError>;
    async fn acknowledge(&self, job: &Job) -> Result<(), QueueError>;
    async fn reject(&self, job: &Job, requeue: bool) -> Result<(), QueueError>;
    async fn extend_visibility(&self, job: &Job, additional_seconds: u64) -> Result<bool, QueueError>;
}

/// Picks the shared backend when a URL is configured, local otherwise — the
/// same deploy-time decision as the cache backend (spec §4.1/§4.2, design
/// note "this selection is a deploy-time config, not a runtime
/// dependency-injection choice").
pub async fn build_queue(config: &QueueConfig) -> Result<Box<dyn Queue>, QueueError> {
    match &config.shared_url {
        Some(url) => {
            let queue = RedisQueue::connect(url).await?;
            Ok(Box::new(queue))
        }
        None => Ok(Box::new(MemoryQueue::new())),
    }
}
