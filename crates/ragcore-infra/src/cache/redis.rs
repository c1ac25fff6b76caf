//! Shared (distributed) cache backend (spec §4.1 "Shared"): real TTLs,
//! atomic `incr`/`set`, cross-process visibility. Structured after
//! `copilot_infra::cache::redis::RedisCache`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::warn;

use super::{validate_key, Cache, CacheError};

pub struct RedisCache {
    connection: ConnectionManager,
    key_prefix: String,
}

fn prefix_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

impl RedisCache {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)
            .map_err(|e| CacheError::ConnectionFailure(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionFailure(e.to_string()))?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        prefix_key(&self.key_prefix, key)
    }

    fn map_err(e: redis::RedisError) -> CacheError {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
            CacheError::ConnectionFailure(e.to_string())
        } else {
            CacheError::OperationFailed(e.to_string())
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(self.make_key(key))
            .await
            .map_err(Self::map_err)?;
        Ok(value)
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn
            .get(self.make_key(key))
            .await
            .map_err(Self::map_err)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.set_bytes(key, value.as_bytes(), ttl).await
    }

    async fn set_bytes(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        let full_key = self.make_key(key);
        match ttl {
            Some(d) if d.is_zero() => {
                let _: i64 = conn.del(full_key).await.map_err(Self::map_err)?;
            }
            Some(d) => {
                let _: () = conn
                    .set_ex(full_key, value, d.as_secs().max(1))
                    .await
                    .map_err(Self::map_err)?;
            }
            None => {
                let _: () = conn.set(full_key, value).await.map_err(Self::map_err)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        let deleted: i64 = conn
            .del(self.make_key(key))
            .await
            .map_err(Self::map_err)?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        let exists: bool = conn
            .exists(self.make_key(key))
            .await
            .map_err(Self::map_err)?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        validate_key(key)?;
        if ttl.is_zero() {
            return Err(CacheError::OperationFailed(
                "expire requires a positive ttl".to_string(),
            ));
        }
        let mut conn = self.connection.clone();
        let existed: bool = conn
            .expire(self.make_key(key), ttl.as_secs().max(1) as i64)
            .await
            .map_err(Self::map_err)?;
        Ok(existed)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        conn.incr(self.make_key(key), delta).await.map_err(|e| {
            if e.to_string().contains("not an integer") {
                CacheError::TypeMismatch
            } else {
                Self::map_err(e)
            }
        })
    }

    async fn decr(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        validate_key(key)?;
        let mut conn = self.connection.clone();
        conn.decr(self.make_key(key), delta).await.map_err(|e| {
            if e.to_string().contains("not an integer") {
                CacheError::TypeMismatch
            } else {
                Self::map_err(e)
            }
        })
    }
}

/// Keys are prefixed; `conn.keys` + iterative delete, for maintenance
/// sweeps (used by `ragcore-ingestion::maintenance`). Not part of the core
/// `Cache` trait because it is a destructive, pattern-based bulk operation.
impl RedisCache {
    pub async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection.clone();
        let full_pattern = self.make_key(pattern);
        let keys: Vec<String> = conn.keys(&full_pattern).await.map_err(Self::map_err)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;
        let _: i64 = conn.del(keys).await.map_err(Self::map_err)?;
        Ok(count)
    }

    pub async fn health_check(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        if pong == "PONG" {
            Ok(())
        } else {
            warn!(response = %pong, "unexpected PING response from redis");
            Err(CacheError::OperationFailed(format!(
                "unexpected PING response: {pong}"
            )))
        }
    }
}
