//! The common source interface every scheduler tick polls (spec §4.9):
//! `name`, `cleanup_stale`, `enqueue_due`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Per-tick outcome counters. Both sources share one shape; a source leaves
/// fields it has no concept of at zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickCounters {
    pub enqueued: u64,
    pub skipped_missing_plugin: u64,
    pub skipped_idempotent: u64,
    pub skipped_no_active_users: u64,
}

#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Marks abandoned RUNNING rows as FAILED; returns the count cleaned.
    async fn cleanup_stale(&self) -> Result<u64>;

    /// Claims up to `limit` due rows and enqueues the corresponding jobs.
    async fn enqueue_due(&self, limit: usize) -> Result<TickCounters>;
}
