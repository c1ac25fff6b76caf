//! Local (in-process) cache backend (spec §4.1 "Local"): thread-safe,
//! expiry checked lazily on access plus a periodic sweep, loses data on
//! restart. Structured after `copilot_infra::cache::memory::MemoryCache`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{validate_key, Cache, CacheError};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Bytes(Vec<u8>),
}

impl StoredValue {
    fn as_text(&self) -> Result<&str, CacheError> {
        match self {
            StoredValue::Text(s) => Ok(s),
            StoredValue::Bytes(_) => Err(CacheError::TypeMismatch),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

/// Single-process, in-memory implementation of the Cache Backend contract.
/// Sufficient for a single-process deployment to pass the same property
/// tests as the shared backend (spec §4.1).
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new(sweep_interval_seconds: u64) -> Self {
        let entries: Arc<RwLock<HashMap<String, Entry>>> = Arc::new(RwLock::new(HashMap::new()));
        let sweep_entries = entries.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(sweep_interval_seconds.max(1)));
            loop {
                interval.tick().await;
                let before = sweep_entries.read().len();
                sweep_entries.write().retain(|_, entry| !entry.is_expired());
                let after = sweep_entries.read().len();
                if before != after {
                    debug!(evicted = before - after, "memory cache sweep evicted expired entries");
                }
            }
        });
        Self { entries }
    }

    fn get_entry(&self, key: &str) -> Option<Entry> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.is_expired() {
            None
        } else {
            Some(entry.clone())
        }
    }

    fn insert(&self, key: &str, value: StoredValue, ttl: Option<Duration>) -> Result<(), CacheError> {
        validate_key(key)?;
        if let Some(d) = ttl {
            if d.is_zero() {
                self.entries.write().remove(key);
                return Ok(());
            }
        }
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        validate_key(key)?;
        match self.get_entry(key) {
            Some(entry) => Ok(Some(entry.value.as_text()?.to_string())),
            None => Ok(None),
        }
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        validate_key(key)?;
        match self.get_entry(key) {
            Some(entry) => match entry.value {
                StoredValue::Bytes(b) => Ok(Some(b)),
                StoredValue::Text(s) => Ok(Some(s.into_bytes())),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.insert(key, StoredValue::Text(value.to_string()), ttl)
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.insert(key, StoredValue::Bytes(value.to_vec()), ttl)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        Ok(self.get_entry(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        validate_key(key)?;
        if ttl.is_zero() {
            return Err(CacheError::OperationFailed(
                "expire requires a positive ttl".to_string(),
            ));
        }
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        validate_key(key)?;
        let mut entries = self.entries.write();
        let current = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry
                .value
                .as_text()?
                .parse::<i64>()
                .map_err(|_| CacheError::TypeMismatch)?,
            _ => 0,
        };
        let next = current + delta;
        let expires_at = entries.get(key).and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.incr(key, -delta).await
    }
}
