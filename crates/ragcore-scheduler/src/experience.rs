//! Experience source (spec §4.9): fans a due, schedulable `Experience` out
//! to one `LLM_WORKFLOW` job per active user, advancing `next_run_at` once
//! per experience regardless of how many users were fanned out to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragcore_core::ids::{ExperienceId, ExperienceRunId, UserId};
use ragcore_core::models::{Experience, Job};
use ragcore_infra::Queue;
use serde_json::Map;
use tracing::{info, warn};

use crate::source::{Source, TickCounters};
use crate::Result;

#[async_trait]
pub trait ExperienceRepository: Send + Sync {
    async fn claim_due(&self, limit: usize) -> Result<Vec<Experience>>;
    async fn save(&self, experience: &Experience) -> Result<()>;
}

#[async_trait]
pub trait ExperienceRunRepository: Send + Sync {
    async fn create_queued(&self, experience_id: &ExperienceId, user_id: &UserId) -> Result<ExperienceRunId>;
}

#[async_trait]
pub trait ActiveUsersProvider: Send + Sync {
    async fn active_user_ids(&self, experience_id: &ExperienceId) -> Result<Vec<UserId>>;
}

pub struct ExperienceSource {
    experiences: Arc<dyn ExperienceRepository>,
    runs: Arc<dyn ExperienceRunRepository>,
    active_users: Arc<dyn ActiveUsersProvider>,
    queue: Arc<dyn Queue>,
}

impl ExperienceSource {
    pub fn new(
        experiences: Arc<dyn ExperienceRepository>,
        runs: Arc<dyn ExperienceRunRepository>,
        active_users: Arc<dyn ActiveUsersProvider>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self { experiences, runs, active_users, queue }
    }
}

/// Reads an `interval_seconds` anchor from `trigger_config`, defaulting to
/// hourly. Full cron/day-time-anchor/creator-timezone semantics are out of
/// scope here (see DESIGN.md); this keeps the advance-once-per-tick
/// contract spec §4.9 requires without modeling a cron parser.
fn next_run_after(experience: &Experience, now: DateTime<Utc>) -> DateTime<Utc> {
    let interval_seconds = experience
        .trigger_config
        .get("interval_seconds")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);
    now + chrono::Duration::seconds(interval_seconds)
}

#[async_trait]
impl Source for ExperienceSource {
    fn name(&self) -> &str {
        "experience"
    }

    async fn cleanup_stale(&self) -> Result<u64> {
        // Experience runs don't carry a RUNNING-staleness contract of their
        // own in this design; the worker's heartbeat governs LLM_WORKFLOW
        // job leases instead.
        Ok(0)
    }

    async fn enqueue_due(&self, limit: usize) -> Result<TickCounters> {
        let mut counters = TickCounters::default();
        let now = Utc::now();

        for mut experience in self.experiences.claim_due(limit).await? {
            let users = match self.active_users.active_user_ids(&experience.id).await {
                Ok(users) => users,
                Err(e) => {
                    warn!(experience_id = %experience.id, error = %e, "failed to resolve active users, still advancing schedule");
                    Vec::new()
                }
            };

            if users.is_empty() {
                counters.skipped_no_active_users += 1;
            }

            for user_id in &users {
                let run_id = match self.runs.create_queued(&experience.id, user_id).await {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(experience_id = %experience.id, user_id = %user_id, error = %e, "failed to create queued run");
                        continue;
                    }
                };

                let mut payload = Map::new();
                payload.insert("experience_id".into(), serde_json::json!(experience.id));
                payload.insert("user_id".into(), serde_json::json!(user_id));
                payload.insert("run_id".into(), serde_json::json!(run_id));
                payload.insert("input_params".into(), serde_json::Value::Object(Map::new()));

                let job = Job::new(ragcore_ingestion::WorkloadType::LlmWorkflow.queue_name(), payload, 3, 600);
                self.queue.enqueue(job).await?;
                counters.enqueued += 1;
            }

            experience.last_run_at = Some(now);
            experience.next_run_at = Some(next_run_after(&experience, now));
            self.experiences.save(&experience).await?;
        }

        info!(enqueued = counters.enqueued, skipped_no_active_users = counters.skipped_no_active_users, "experience tick complete");
        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ragcore_core::models::{ExperienceVisibility, TriggerType};
    use ragcore_infra::MemoryQueue;

    struct FakeExperiences {
        experiences: Mutex<Vec<Experience>>,
    }

    #[async_trait]
    impl ExperienceRepository for FakeExperiences {
        async fn claim_due(&self, limit: usize) -> Result<Vec<Experience>> {
            let experiences = self.experiences.lock();
            Ok(experiences.iter().filter(|e| e.is_due(Utc::now())).take(limit).cloned().collect())
        }

        async fn save(&self, experience: &Experience) -> Result<()> {
            let mut experiences = self.experiences.lock();
            if let Some(existing) = experiences.iter_mut().find(|e| e.id == experience.id) {
                *existing = experience.clone();
            }
            Ok(())
        }
    }

    struct FakeRuns;

    #[async_trait]
    impl ExperienceRunRepository for FakeRuns {
        async fn create_queued(&self, _experience_id: &ExperienceId, _user_id: &UserId) -> Result<ExperienceRunId> {
            Ok(ExperienceRunId::generate())
        }
    }

    struct FakeActiveUsers {
        users: Vec<UserId>,
    }

    #[async_trait]
    impl ActiveUsersProvider for FakeActiveUsers {
        async fn active_user_ids(&self, _experience_id: &ExperienceId) -> Result<Vec<UserId>> {
            Ok(self.users.clone())
        }
    }

    fn experience() -> Experience {
        Experience {
            id: ExperienceId::generate(),
            name: "weekly digest".to_string(),
            trigger_type: TriggerType::Scheduled,
            trigger_config: Map::new(),
            visibility: ExperienceVisibility::Published,
            steps: Vec::new(),
            model_configuration_id: None,
            created_by: UserId::generate(),
            next_run_at: None,
            last_run_at: None,
        }
    }

    #[tokio::test]
    async fn fans_out_one_job_per_active_user() {
        let exp = experience();
        let exp_id = exp.id.clone();
        let experiences = Arc::new(FakeExperiences { experiences: Mutex::new(vec![exp]) });
        let runs = Arc::new(FakeRuns);
        let active_users = Arc::new(FakeActiveUsers { users: vec![UserId::generate(), UserId::generate()] });
        let queue = Arc::new(MemoryQueue::new());
        let source = ExperienceSource::new(experiences.clone(), runs, active_users, queue);

        let counters = source.enqueue_due(10).await.unwrap();
        assert_eq!(counters.enqueued, 2);

        let saved = experiences.experiences.lock().iter().find(|e| e.id == exp_id).unwrap().clone();
        assert!(saved.next_run_at.is_some());
    }

    #[tokio::test]
    async fn no_active_users_still_advances_schedule() {
        let exp = experience();
        let exp_id = exp.id.clone();
        let experiences = Arc::new(FakeExperiences { experiences: Mutex::new(vec![exp]) });
        let runs = Arc::new(FakeRuns);
        let active_users = Arc::new(FakeActiveUsers { users: Vec::new() });
        let queue = Arc::new(MemoryQueue::new());
        let source = ExperienceSource::new(experiences.clone(), runs, active_users, queue);

        let counters = source.enqueue_due(10).await.unwrap();
        assert_eq!(counters.enqueued, 0);
        assert_eq!(counters.skipped_no_active_users, 1);
        assert!(experiences.experiences.lock().iter().find(|e| e.id == exp_id).unwrap().next_run_at.is_some());
    }
}
