//! File Staging Service (C4, spec §4.5): stages binary content between
//! pipeline stages using the Cache Backend's byte operations. Grounded on
//! `copilot-infrastructure`'s cache-backed blob staging pattern, generalized
//! to the `file_staging:<document_id>` key format and 1-hour default TTL.

use std::sync::Arc;
use std::time::Duration;

use ragcore_core::ids::DocumentId;
use ragcore_infra::Cache;
use tracing::warn;

use crate::{IngestionError, Result};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub struct FileStagingService {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl FileStagingService {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache, ttl: DEFAULT_TTL }
    }

    pub fn with_ttl(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(document_id: &DocumentId) -> String {
        format!("file_staging:{document_id}")
    }

    /// Stores `bytes` and returns the staging key.
    pub async fn stage(&self, document_id: &DocumentId, bytes: &[u8]) -> Result<String> {
        let key = Self::key(document_id);
        self.cache.set_bytes(&key, bytes, Some(self.ttl)).await?;
        Ok(key)
    }

    /// Retrieves staged bytes, then best-effort deletes the key (failure to
    /// delete is non-fatal because the TTL guarantees eventual cleanup).
    pub async fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        let bytes = self
            .cache
            .get_bytes(key)
            .await?
            .ok_or_else(|| IngestionError::FileStagingMissing(key.to_string()))?;
        if let Err(e) = self.cache.delete(key).await {
            warn!(error = %e, key = %key, "best-effort staging cleanup failed; TTL will expire it");
        }
        Ok(bytes)
    }

    /// Retrieves staged bytes without deleting (kept for retries, per stage
    /// handlers that defer cleanup until they've successfully committed).
    pub async fn peek(&self, key: &str) -> Result<Vec<u8>> {
        self.cache
            .get_bytes(key)
            .await?
            .ok_or_else(|| IngestionError::FileStagingMissing(key.to_string()))
    }

    /// Explicit cleanup after a non-retryable failure.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.cache.delete(key).await?;
        Ok(())
    }
}
