//! Shared (distributed) queue backend (spec §4.2): multi-replica safe FIFO
//! queues with visibility timeouts, built from Redis sorted sets + hashes
//! rather than Redis Streams, to keep the visibility-timeout/ack/reject
//! vocabulary identical to the local backend. Structured after
//! `copilot_infra::cache::redis::RedisCache`'s direct use of `redis::aio::ConnectionManager`.
//!
//! Layout per queue `q`: a `ready` zset scored by enqueue time (for FIFO
//! pop-order), a `processing` zset scored by lease deadline, and one hash
//! per job holding its serialized [`Job`]. `attempts` inside the stored job
//! is the lease fence: `acknowledge`/`reject`/`extend_visibility` compare
//! the caller's `job.attempts` against what is currently stored and treat a
//! mismatch as a stale handle from an already-expired, already-redelivered
//! lease.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use async_trait::async_trait;
use ragcore_core::models::Job;

use super::{Queue, QueueError};

pub struct RedisQueue {
    connection: ConnectionManager,
}

impl RedisQueue {
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client =
            Client::open(url).map_err(|e| QueueError::ConnectionFailure(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailure(e.to_string()))?;
        Ok(Self { connection })
    }

    fn ready_key(queue_name: &str) -> String {
        format!("ragcore:q:{queue_name}:ready")
    }

    fn processing_key(queue_name: &str) -> String {
        format!("ragcore:q:{queue_name}:processing")
    }

    fn job_key(job_id: &str) -> String {
        format!("ragcore:job:{job_id}")
    }

    fn map_err(e: redis::RedisError) -> QueueError {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            QueueError::ConnectionFailure(e.to_string())
        } else {
            QueueError::OperationFailed(e.to_string())
        }
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        let mut conn = self.connection.clone();
        let data: Option<String> = conn
            .hget(Self::job_key(job_id), "data")
            .await
            .map_err(Self::map_err)?;
        match data {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| QueueError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn store_job(&self, job: &Job) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        let json =
            serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let _: () = conn
            .hset(Self::job_key(&job.id.to_string()), "data", json)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    /// Moves members of `processing` whose lease deadline has passed back
    /// into `ready`. Run opportunistically at the start of every `dequeue`.
    async fn reap_expired(&self, queue_name: &str) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        let now_ms = Utc::now().timestamp_millis();
        let expired: Vec<String> = conn
            .zrangebyscore(Self::processing_key(queue_name), "-inf", now_ms)
            .await
            .map_err(Self::map_err)?;
        for id in expired {
            let _: i64 = conn
                .zrem(Self::processing_key(queue_name), &id)
                .await
                .map_err(Self::map_err)?;
            let _: i64 = conn
                .zadd(Self::ready_key(queue_name), &id, now_ms)
                .await
                .map_err(Self::map_err)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let mut conn = self.connection.clone();
        let queue_name = job.queue_name.clone();
        let id = job.id.to_string();
        let score = job.enqueued_at.timestamp_millis();
        self.store_job(&job).await?;
        let _: i64 = conn
            .zadd(Self::ready_key(&queue_name), &id, score)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>, QueueError> {
        self.reap_expired(queue_name).await?;
        let mut conn = self.connection.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmin(Self::ready_key(queue_name), 1)
            .await
            .map_err(Self::map_err)?;
        let Some((id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let Some(mut job) = self.load_job(&id).await? else {
            return Ok(None);
        };
        job.attempts += 1;
        job.last_delivered_at = Some(Utc::now());
        self.store_job(&job).await?;
        let deadline_ms =
            Utc::now().timestamp_millis() + (job.visibility_timeout_seconds.max(1) as i64 * 1000);
        let _: i64 = conn
            .zadd(Self::processing_key(queue_name), &id, deadline_ms)
            .await
            .map_err(Self::map_err)?;
        Ok(Some(job))
    }

    async fn acknowledge(&self, job: &Job) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let Some(stored) = self.load_job(&id).await? else {
            return Ok(());
        };
        if stored.attempts != job.attempts {
            return Ok(()); // stale handle from an expired, already-redelivered lease
        }
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .zrem(Self::processing_key(&job.queue_name), &id)
            .await
            .map_err(Self::map_err)?;
        let _: i64 = conn
            .del(Self::job_key(&id))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn reject(&self, job: &Job, requeue: bool) -> Result<(), QueueError> {
        let id = job.id.to_string();
        let Some(stored) = self.load_job(&id).await? else {
            return Ok(());
        };
        if stored.attempts != job.attempts {
            return Ok(());
        }
        let mut conn = self.connection.clone();
        let _: i64 = conn
            .zrem(Self::processing_key(&job.queue_name), &id)
            .await
            .map_err(Self::map_err)?;
        if requeue {
            let now_ms = Utc::now().timestamp_millis();
            let _: i64 = conn
                .zadd(Self::ready_key(&job.queue_name), &id, now_ms)
                .await
                .map_err(Self::map_err)?;
        } else {
            let _: i64 = conn
                .del(Self::job_key(&id))
                .await
                .map_err(Self::map_err)?;
        }
        Ok(())
    }

    async fn extend_visibility(&self, job: &Job, additional_seconds: u64) -> Result<bool, QueueError> {
        let id = job.id.to_string();
        let Some(stored) = self.load_job(&id).await? else {
            return Ok(false);
        };
        if stored.attempts != job.attempts {
            return Ok(false);
        }
        let mut conn = self.connection.clone();
        let score: Option<f64> = conn
            .zscore(Self::processing_key(&job.queue_name), &id)
            .await
            .map_err(Self::map_err)?;
        if score.is_none() {
            return Ok(false); // already reaped back to ready (or redelivered)
        }
        let new_deadline =
            Utc::now().timestamp_millis() + (additional_seconds.max(1) as i64 * 1000);
        let _: i64 = conn
            .zadd(Self::processing_key(&job.queue_name), &id, new_deadline)
            .await
            .map_err(Self::map_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_helpers_are_namespaced_per_queue() {
        assert_eq!(RedisQueue::ready_key("shu:ingestion"), "ragcore:q:shu:ingestion:ready");
        assert_eq!(
            RedisQueue::processing_key("shu:ingestion"),
            "ragcore:q:shu:ingestion:processing"
        );
        assert_eq!(RedisQueue::job_key("abc"), "ragcore:job:abc");
    }
}
