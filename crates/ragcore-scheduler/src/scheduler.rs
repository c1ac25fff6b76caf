//! One tick loop per process (spec §4.9): every `tick_interval`, run
//! `cleanup_stale` then `enqueue_due` across every configured source, and
//! record the result in the bounded history.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::history::{TickHistory, TickRecord};
use crate::source::Source;

pub struct SchedulerRuntime {
    sources: Vec<Arc<dyn Source>>,
    tick_interval: Duration,
    batch_size: usize,
    history: Arc<TickHistory>,
}

impl SchedulerRuntime {
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        tick_interval: Duration,
        batch_size: usize,
        history_capacity: usize,
    ) -> Self {
        Self { sources, tick_interval, batch_size, history: Arc::new(TickHistory::new(history_capacity)) }
    }

    pub fn history(&self) -> Arc<TickHistory> {
        self.history.clone()
    }

    /// Runs one tick across every source. Exposed separately from `run` so
    /// tests and one-shot admin tooling can drive a tick without a loop.
    pub async fn tick(&self) {
        let tick_at = chrono::Utc::now();
        let mut stale_cleaned = HashMap::new();
        let mut counters = HashMap::new();

        for source in &self.sources {
            match source.cleanup_stale().await {
                Ok(count) => {
                    stale_cleaned.insert(source.name().to_string(), count);
                }
                Err(e) => {
                    error!(source = source.name(), error = %e, "cleanup_stale failed");
                }
            }

            match source.enqueue_due(self.batch_size).await {
                Ok(tick_counters) => {
                    counters.insert(source.name().to_string(), tick_counters);
                }
                Err(e) => {
                    error!(source = source.name(), error = %e, "enqueue_due failed");
                }
            }
        }

        info!(sources = self.sources.len(), "scheduler tick complete");
        self.history.record(TickRecord { tick_at, stale_cleaned, counters });
    }

    /// Runs until `shutdown` reports `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler loop exiting on shutdown signal");
                        break;
                    }
                }
            }
        }
    }
}
