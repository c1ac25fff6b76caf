//! Plugin feed source (spec §4.9): due `PluginFeed` rows become `INGESTION`
//! jobs, gated by plugin-registration and idempotency checks, with a
//! stale-`RUNNING`-execution sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ragcore_core::ids::{PluginExecutionId, PluginFeedId, UserId};
use ragcore_core::models::{Job, PluginFeed};
use ragcore_infra::Queue;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::source::{Source, TickCounters};
use crate::Result;

#[async_trait]
pub trait PluginFeedRepository: Send + Sync {
    /// Claims up to `limit` enabled, due feeds, skipping rows already
    /// locked by another scheduler replica (`FOR UPDATE SKIP LOCKED`
    /// semantics, spec §4.9).
    async fn claim_due(&self, limit: usize) -> Result<Vec<PluginFeed>>;
    async fn save(&self, feed: &PluginFeed) -> Result<()>;
    async fn plugin_is_registered_and_enabled(&self, plugin_name: &str) -> Result<bool>;
}

#[async_trait]
pub trait PluginExecutionRepository: Send + Sync {
    async fn has_in_flight(&self, schedule_id: &PluginFeedId) -> Result<bool>;
    async fn create_pending(
        &self,
        schedule_id: &PluginFeedId,
        plugin_name: &str,
        user_id: &UserId,
        agent_key: Option<&str>,
        params: Map<String, Value>,
    ) -> Result<PluginExecutionId>;

    /// Marks RUNNING executions whose `updated_at` predates `older_than_seconds`
    /// ago as FAILED with the given reason; returns the count.
    async fn mark_stale_running_as_failed(&self, older_than_seconds: i64, reason: &str) -> Result<u64>;
}

enum FeedOutcome {
    MissingPlugin,
    AlreadyInFlight,
    Enqueued,
}

pub struct PluginFeedSource {
    feeds: Arc<dyn PluginFeedRepository>,
    executions: Arc<dyn PluginExecutionRepository>,
    queue: Arc<dyn Queue>,
    running_timeout_seconds: i64,
}

impl PluginFeedSource {
    pub fn new(
        feeds: Arc<dyn PluginFeedRepository>,
        executions: Arc<dyn PluginExecutionRepository>,
        queue: Arc<dyn Queue>,
        running_timeout_seconds: i64,
    ) -> Self {
        Self { feeds, executions, queue, running_timeout_seconds }
    }

    async fn process_one(&self, feed: &PluginFeed) -> Result<FeedOutcome> {
        if !self.feeds.plugin_is_registered_and_enabled(&feed.plugin_name).await? {
            warn!(plugin_name = %feed.plugin_name, feed_id = %feed.id, "plugin not registered or disabled, skipping");
            return Ok(FeedOutcome::MissingPlugin);
        }

        if self.executions.has_in_flight(&feed.id).await? {
            return Ok(FeedOutcome::AlreadyInFlight);
        }

        let execution_id = self
            .executions
            .create_pending(
                &feed.id,
                &feed.plugin_name,
                &feed.owner_user_id,
                feed.agent_key.as_deref(),
                feed.params.clone(),
            )
            .await?;

        let mut payload = Map::new();
        payload.insert("execution_id".into(), serde_json::json!(execution_id));
        payload.insert("schedule_id".into(), serde_json::json!(feed.id));
        payload.insert("plugin_name".into(), serde_json::json!(feed.plugin_name));
        payload.insert("user_id".into(), serde_json::json!(feed.owner_user_id));
        payload.insert("agent_key".into(), serde_json::json!(feed.agent_key));
        payload.insert("params".into(), Value::Object(feed.params.clone()));

        let job = Job::new(ragcore_ingestion::WorkloadType::Ingestion.queue_name(), payload, 3, 3600);
        self.queue.enqueue(job).await?;

        Ok(FeedOutcome::Enqueued)
    }
}

#[async_trait]
impl Source for PluginFeedSource {
    fn name(&self) -> &str {
        "plugin_feed"
    }

    async fn cleanup_stale(&self) -> Result<u64> {
        self.executions
            .mark_stale_running_as_failed(self.running_timeout_seconds, "stale_timeout")
            .await
    }

    /// Always calls `schedule_next()` and persists the feed regardless of
    /// outcome, per spec §4.9's closing "Always call schedule.schedule_next()"
    /// — otherwise a disabled-plugin feed would hot-loop every tick.
    async fn enqueue_due(&self, limit: usize) -> Result<TickCounters> {
        let mut counters = TickCounters::default();
        let now = Utc::now();
        let feeds = self.feeds.claim_due(limit).await?;

        for mut feed in feeds {
            match self.process_one(&feed).await {
                Ok(FeedOutcome::MissingPlugin) => counters.skipped_missing_plugin += 1,
                Ok(FeedOutcome::AlreadyInFlight) => counters.skipped_idempotent += 1,
                Ok(FeedOutcome::Enqueued) => counters.enqueued += 1,
                Err(e) => {
                    warn!(feed_id = %feed.id, error = %e, "plugin feed tick failed, still advancing schedule");
                }
            }

            feed.schedule_next(now);
            self.feeds.save(&feed).await?;
        }

        info!(enqueued = counters.enqueued, skipped_missing_plugin = counters.skipped_missing_plugin, skipped_idempotent = counters.skipped_idempotent, "plugin feed tick complete");
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ragcore_infra::MemoryQueue;
    use std::collections::HashSet;

    struct FakeFeeds {
        feeds: Mutex<Vec<PluginFeed>>,
        disabled_plugins: HashSet<String>,
    }

    #[async_trait]
    impl PluginFeedRepository for FakeFeeds {
        async fn claim_due(&self, limit: usize) -> Result<Vec<PluginFeed>> {
            let feeds = self.feeds.lock();
            Ok(feeds.iter().filter(|f| f.is_due(Utc::now())).take(limit).cloned().collect())
        }

        async fn save(&self, feed: &PluginFeed) -> Result<()> {
            let mut feeds = self.feeds.lock();
            if let Some(existing) = feeds.iter_mut().find(|f| f.id == feed.id) {
                *existing = feed.clone();
            }
            Ok(())
        }

        async fn plugin_is_registered_and_enabled(&self, plugin_name: &str) -> Result<bool> {
            Ok(!self.disabled_plugins.contains(plugin_name))
        }
    }

    #[derive(Default)]
    struct FakeExecutions {
        in_flight: Mutex<HashSet<PluginFeedId>>,
    }

    #[async_trait]
    impl PluginExecutionRepository for FakeExecutions {
        async fn has_in_flight(&self, schedule_id: &PluginFeedId) -> Result<bool> {
            Ok(self.in_flight.lock().contains(schedule_id))
        }

        async fn create_pending(
            &self,
            schedule_id: &PluginFeedId,
            _plugin_name: &str,
            _user_id: &UserId,
            _agent_key: Option<&str>,
            _params: Map<String, Value>,
        ) -> Result<PluginExecutionId> {
            self.in_flight.lock().insert(schedule_id.clone());
            Ok(PluginExecutionId::generate())
        }

        async fn mark_stale_running_as_failed(&self, _older_than_seconds: i64, _reason: &str) -> Result<u64> {
            Ok(0)
        }
    }

    fn feed(plugin_name: &str) -> PluginFeed {
        PluginFeed {
            id: PluginFeedId::generate(),
            name: "test feed".to_string(),
            plugin_name: plugin_name.to_string(),
            agent_key: None,
            owner_user_id: UserId::generate(),
            params: Map::new(),
            interval_seconds: 300,
            enabled: true,
            next_run_at: None,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn due_feed_enqueues_and_advances_schedule() {
        let f = feed("demo-plugin");
        let feed_id = f.id.clone();
        let feeds = Arc::new(FakeFeeds { feeds: Mutex::new(vec![f]), disabled_plugins: HashSet::new() });
        let executions = Arc::new(FakeExecutions::default());
        let queue = Arc::new(MemoryQueue::new());
        let source = PluginFeedSource::new(feeds.clone(), executions, queue, 600);

        let counters = source.enqueue_due(10).await.unwrap();
        assert_eq!(counters.enqueued, 1);

        let saved = feeds.feeds.lock().iter().find(|f| f.id == feed_id).unwrap().clone();
        assert!(saved.next_run_at.is_some());
    }

    #[tokio::test]
    async fn disabled_plugin_is_skipped_but_schedule_still_advances() {
        let f = feed("missing-plugin");
        let mut disabled = HashSet::new();
        disabled.insert("missing-plugin".to_string());
        let feeds = Arc::new(FakeFeeds { feeds: Mutex::new(vec![f]), disabled_plugins: disabled });
        let executions = Arc::new(FakeExecutions::default());
        let queue = Arc::new(MemoryQueue::new());
        let source = PluginFeedSource::new(feeds.clone(), executions, queue, 600);

        let counters = source.enqueue_due(10).await.unwrap();
        assert_eq!(counters.skipped_missing_plugin, 1);
        assert_eq!(counters.enqueued, 0);
        assert!(feeds.feeds.lock()[0].next_run_at.is_some());
    }

    #[tokio::test]
    async fn in_flight_execution_is_skipped_idempotently() {
        let f = feed("demo-plugin");
        let feed_id = f.id.clone();
        let feeds = Arc::new(FakeFeeds { feeds: Mutex::new(vec![f]), disabled_plugins: HashSet::new() });
        let executions = Arc::new(FakeExecutions::default());
        executions.in_flight.lock().insert(feed_id);
        let queue = Arc::new(MemoryQueue::new());
        let source = PluginFeedSource::new(feeds, executions, queue, 600);

        let counters = source.enqueue_due(10).await.unwrap();
        assert_eq!(counters.skipped_idempotent, 1);
        assert_eq!(counters.enqueued, 0);
    }
}
