//! Local (in-process) queue backend (spec §4.2): acceptable only for
//! single-process deployments, but must pass the same property tests as the
//! shared backend (visibility-timeout redelivery, ack removal, requeue,
//! extend_visibility).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use ragcore_core::models::Job;

use super::{Queue, QueueError};

#[derive(Debug, Clone)]
enum LeaseState {
    Ready,
    Leased { deadline: Instant },
}

#[derive(Debug, Clone)]
struct JobRecord {
    job: Job,
    state: LeaseState,
}

/// In-memory FIFO queue. A job's `attempts` count doubles as a lease
/// generation: `extend_visibility`/`acknowledge`/`reject` only succeed
/// against the delivery they were issued for, so a caller holding a stale
/// `Job` (from a lease that already expired and was re-delivered) correctly
/// fails rather than silently acting on someone else's lease.
pub struct MemoryQueue {
    jobs: Mutex<HashMap<String, JobRecord>>,
    ready: Mutex<HashMap<String, VecDeque<String>>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            ready: Mutex::new(HashMap::new()),
        }
    }

    /// Moves any jobs in `queue_name` whose visibility lease has expired
    /// back into the ready queue, incrementing their lease generation so a
    /// late `extend_visibility` from the original consumer is rejected.
    fn reap_expired(&self, queue_name: &str) {
        let now = Instant::now();
        let mut expired_ids = Vec::new();
        {
            let jobs = self.jobs.lock();
            for (id, record) in jobs.iter() {
                if record.job.queue_name != queue_name {
                    continue;
                }
                if let LeaseState::Leased { deadline } = record.state {
                    if now >= deadline {
                        expired_ids.push(id.clone());
                    }
                }
            }
        }
        if expired_ids.is_empty() {
            return;
        }
        let mut jobs = self.jobs.lock();
        let mut ready = self.ready.lock();
        for id in expired_ids {
            if let Some(record) = jobs.get_mut(&id) {
                record.state = LeaseState::Ready;
                ready
                    .entry(queue_name.to_string())
                    .or_default()
                    .push_back(id);
            }
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let queue_name = job.queue_name.clone();
        self.jobs.lock().insert(
            id.clone(),
            JobRecord {
                job,
                state: LeaseState::Ready,
            },
        );
        self.ready.lock().entry(queue_name).or_default().push_back(id);
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>, QueueError> {
        self.reap_expired(queue_name);
        let next_id = {
            let mut ready = self.ready.lock();
            ready.get_mut(queue_name).and_then(|q| q.pop_front())
        };
        let Some(id) = next_id else {
            return Ok(None);
        };
        let mut jobs = self.jobs.lock();
        let Some(record) = jobs.get_mut(&id) else {
            return Ok(None);
        };
        record.job.attempts += 1;
        record.job.last_delivered_at = Some(chrono::Utc::now());
        record.state = LeaseState::Leased {
            deadline: Instant::now()
                + Duration::from_secs(record.job.visibility_timeout_seconds.max(1)),
        };
        Ok(Some(record.job.clone()))
    }

    async fn acknowledge(&self, job: &Job) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let mut jobs = self.jobs.lock();
        match jobs.get(&id) {
            Some(record) if record.job.attempts == job.attempts => {
                jobs.remove(&id);
                Ok(())
            }
            Some(_) => Ok(()), // stale ack from an expired lease: no-op, matches at-least-once semantics
            None => Ok(()),
        }
    }

    async fn reject(&self, job: &Job, requeue: bool) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let mut jobs = self.jobs.lock();
        let Some(record) = jobs.get_mut(&id) else {
            return Ok(());
        };
        if record.job.attempts != job.attempts {
            return Ok(()); // stale handle; the current delivery owns the job now
        }
        if requeue {
            record.state = LeaseState::Ready;
            drop(jobs);
            self.ready
                .lock()
                .entry(job.queue_name.clone())
                .or_default()
                .push_back(id);
        } else {
            jobs.remove(&id);
        }
        Ok(())
    }

    async fn extend_visibility(&self, job: &Job, additional_seconds: u64) -> Result<bool, QueueError> {
        let id = job.id.to_string();
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(&id) {
            Some(record) if record.job.attempts == job.attempts => match record.state {
                LeaseState::Leased { deadline } if Instant::now() < deadline => {
                    record.state = LeaseState::Leased {
                        deadline: Instant::now() + Duration::from_secs(additional_seconds.max(1)),
                    };
                    Ok(true)
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn job(queue: &str, max_attempts: u32, visibility: u64) -> Job {
        Job::new(queue, Map::new(), max_attempts, visibility)
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_returns_the_job() {
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 30)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().expect("job present");
        assert_eq!(leased.attempts, 1);
        assert!(q.dequeue("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acknowledge_removes_the_job_permanently() {
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 30)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().unwrap();
        q.acknowledge(&leased).await.unwrap();
        // even after the visibility window, it must not reappear
        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(q.dequeue("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reject_with_requeue_makes_it_available_again() {
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 30)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().unwrap();
        q.reject(&leased, true).await.unwrap();
        let redelivered = q.dequeue("q1").await.unwrap().expect("requeued job present");
        assert_eq!(redelivered.attempts, 2);
    }

    #[tokio::test]
    async fn reject_without_requeue_discards() {
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 30)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().unwrap();
        q.reject(&leased, false).await.unwrap();
        assert!(q.dequeue("q1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extend_visibility_prolongs_the_lease() {
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 1)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().unwrap();
        assert!(q.extend_visibility(&leased, 60).await.unwrap());
    }

    #[tokio::test]
    async fn extend_visibility_fails_once_lease_expired_and_redelivered() {
        tokio::time::pause();
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 1)).await.unwrap();
        let leased = q.dequeue("q1").await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        // redelivery happens on the next dequeue call for this queue
        let redelivered = q.dequeue("q1").await.unwrap();
        assert!(redelivered.is_some());
        assert!(!q.extend_visibility(&leased, 60).await.unwrap());
    }

    #[tokio::test]
    async fn expired_visibility_timeout_makes_job_redeliverable() {
        tokio::time::pause();
        let q = MemoryQueue::new();
        q.enqueue(job("q1", 3, 1)).await.unwrap();
        let first = q.dequeue("q1").await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        let second = q.dequeue("q1").await.unwrap().expect("redelivered");
        assert_eq!(first.id, second.id);
        assert_eq!(second.attempts, 2);
    }
}
