//! Cache Backend (C1, spec §4.1): key/value + bytes + atomic counters with
//! TTL, implemented by two interchangeable backends. Selection between them
//! is config-driven (spec §4.1 "Selection is configuration-driven"), done by
//! [`build_cache`].

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use ragcore_core::config::CacheConfig;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis::RedisCache;

/// Failure kinds from spec §4.1. `ConnectionFailure` must be distinguishable
/// from the others so the rate limiter (§4.4) can fail open specifically on
/// it and not on, say, a type mismatch that indicates a real bug.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection failure: {0}")]
    ConnectionFailure(String),
    #[error("invalid key: key must not be empty")]
    InvalidKey,
    #[error("type mismatch: value at key is not a valid integer")]
    TypeMismatch,
    #[error("cache operation failed: {0}")]
    OperationFailed(String),
}

impl CacheError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, CacheError::ConnectionFailure(_))
    }
}

fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        Err(CacheError::InvalidKey)
    } else {
        Ok(())
    }
}

/// The cache contract (spec §4.1). Implemented by [`MemoryCache`] (local,
/// in-process) and [`RedisCache`] (shared, distributed); both must behave
/// identically for every operation here, which is why the method set is
/// this narrow rather than exposing backend-specific extras.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// `ttl <= 0` (i.e. `Some(Duration::ZERO)`) deletes immediately (spec §4.1).
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// `ttl` must be positive; returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;
    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError>;
}

/// Picks the shared backend when a URL is configured, local otherwise (spec §4.1).
pub async fn build_cache(config: &CacheConfig) -> Result<Box<dyn Cache>, CacheError> {
    match &config.shared_url {
        Some(url) => {
            let cache = RedisCache::connect(url, &config.key_prefix).await?;
            Ok(Box::new(cache))
        }
        None => Ok(Box::new(MemoryCache::new(config.local_sweep_interval_seconds))),
    }
}
