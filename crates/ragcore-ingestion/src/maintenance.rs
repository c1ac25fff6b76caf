//! `MAINTENANCE` workload handler (spec §6 "reserved"; supplemented feature
//! per SPEC_FULL §6 grounded on the original backend's
//! `tasks/cleanup_orphaned_attachments.py` periodic job). Deletes staged
//! files whose owning document no longer exists — orphaned when a document
//! was deleted after staging but before the OCR job ran, or never ran at
//! all because a worker died mid-stage.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::stages::DocumentRepository;
use crate::Result;
use ragcore_infra::Cache;

/// Backend-specific enumeration of `file_staging:*` keys. The fixed-window
/// Cache trait has no key-listing operation (spec §4.1 doesn't need one),
/// so this is a narrow extra seam only the maintenance sweep uses.
#[async_trait]
pub trait StagingKeyScanner: Send + Sync {
    async fn staging_keys(&self) -> Result<Vec<String>>;
}

pub struct AttachmentCleanup {
    cache: Arc<dyn Cache>,
    scanner: Arc<dyn StagingKeyScanner>,
    documents: Arc<dyn DocumentRepository>,
}

impl AttachmentCleanup {
    pub fn new(
        cache: Arc<dyn Cache>,
        scanner: Arc<dyn StagingKeyScanner>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Self {
        Self { cache, scanner, documents }
    }

    /// Deletes every staged key whose `document_id` no longer resolves.
    /// Returns the number of keys removed.
    pub async fn run(&self) -> Result<u64> {
        let keys = self.scanner.staging_keys().await?;
        let mut removed = 0u64;
        let mut checked: HashSet<String> = HashSet::new();

        for key in keys {
            let Some(document_id) = key.strip_prefix("file_staging:") else {
                continue;
            };
            if !checked.insert(document_id.to_string()) {
                continue;
            }
            let exists = self
                .documents
                .get(&ragcore_core::ids::DocumentId::from(document_id.to_string()))
                .await?
                .is_some();
            if exists {
                continue;
            }
            match self.cache.delete(&key).await {
                Ok(true) => {
                    removed += 1;
                    info!(key = %key, "removed orphaned staged attachment");
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, key = %key, "failed to remove orphaned staged attachment"),
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragcore_core::ids::{DocumentId, KnowledgeBaseId};
    use ragcore_core::models::Document;
    use ragcore_infra::MemoryCache;
    use std::time::Duration;

    struct FixedScanner(Vec<String>);
    #[async_trait]
    impl StagingKeyScanner for FixedScanner {
        async fn staging_keys(&self) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct EmptyDocuments;
    #[async_trait]
    impl DocumentRepository for EmptyDocuments {
        async fn get(&self, _id: &DocumentId) -> Result<Option<Document>> {
            Ok(None)
        }
        async fn upsert(&self, document: Document) -> Result<Document> {
            Ok(document)
        }
        async fn delete(&self, _id: &DocumentId) -> Result<bool> {
            Ok(false)
        }
        async fn find_by_source(
            &self,
            _knowledge_base_id: &KnowledgeBaseId,
            _source_type: &str,
            _source_id: &str,
        ) -> Result<Option<Document>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn removes_keys_with_no_matching_document() {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(60));
        cache.set_bytes("file_staging:doc-1", b"x", Some(Duration::from_secs(60))).await.unwrap();
        let scanner: Arc<dyn StagingKeyScanner> =
            Arc::new(FixedScanner(vec!["file_staging:doc-1".to_string()]));
        let documents: Arc<dyn DocumentRepository> = Arc::new(EmptyDocuments);

        let cleanup = AttachmentCleanup::new(cache.clone(), scanner, documents);
        let removed = cleanup.run().await.unwrap();

        assert_eq!(removed, 1);
        assert!(!cache.exists("file_staging:doc-1").await.unwrap());
    }
}
