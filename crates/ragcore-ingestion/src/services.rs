//! Glue services around documents and knowledge bases (C13, spec §4.7.6):
//! counter maintenance and magic-byte validation at upload time. Grounded
//! on the teacher's `copilot-ingestion::processors::MetadataEnricher`
//! shape for the validation side, and on the denormalized-counter pattern
//! implied by `KnowledgeBase.document_count`/`total_chunks` in the data
//! model (spec §3).

use ragcore_core::ids::{DocumentId, KnowledgeBaseId};
use ragcore_core::models::Document;

use crate::stages::{DocumentRepository, KnowledgeBaseRepository};
use crate::{IngestionError, Result};

/// File-signature prefixes used to detect a declared-extension mismatch
/// (spec §4.7.6 "Magic-byte validation"). Not exhaustive — covers the
/// common upload formats the ingestion entry points accept.
const MAGIC_BYTES: &[(&str, &[u8])] = &[
    ("application/pdf", b"%PDF"),
    ("image/png", &[0x89, 0x50, 0x4E, 0x47]),
    ("image/jpeg", &[0xFF, 0xD8, 0xFF]),
    ("application/zip", &[0x50, 0x4B, 0x03, 0x04]),
];

/// Rejects uploads whose declared MIME type doesn't match the file's
/// binary signature. Types outside the known table are allowed through
/// (the check only catches a mismatch we can actually detect).
pub fn validate_magic_bytes(declared_mime: &str, bytes: &[u8]) -> Result<()> {
    let Some((_, signature)) = MAGIC_BYTES.iter().find(|(mime, _)| *mime == declared_mime) else {
        return Ok(());
    };
    if bytes.starts_with(signature) {
        return Ok(());
    }
    let detected = MAGIC_BYTES
        .iter()
        .find(|(_, sig)| bytes.starts_with(sig))
        .map(|(mime, _)| mime.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Err(IngestionError::ContentTypeMismatch {
        declared: declared_mime.to_string(),
        detected,
    })
}

/// Denormalized counter maintenance for a knowledge base (spec §4.7.6):
/// manual uploads increment `document_count` immediately; chunk counts are
/// adjusted once the embed stage records a final `chunk_count`.
#[async_trait::async_trait]
pub trait KnowledgeBaseCounters: Send + Sync {
    async fn adjust_document_count(&self, id: &KnowledgeBaseId, delta: i64) -> Result<()>;
    async fn adjust_chunk_count(&self, id: &KnowledgeBaseId, delta: i64) -> Result<()>;
}

pub struct DocumentService {
    documents: std::sync::Arc<dyn DocumentRepository>,
    knowledge_bases: std::sync::Arc<dyn KnowledgeBaseRepository>,
    counters: std::sync::Arc<dyn KnowledgeBaseCounters>,
}

impl DocumentService {
    pub fn new(
        documents: std::sync::Arc<dyn DocumentRepository>,
        knowledge_bases: std::sync::Arc<dyn KnowledgeBaseRepository>,
        counters: std::sync::Arc<dyn KnowledgeBaseCounters>,
    ) -> Self {
        Self { documents, knowledge_bases, counters }
    }

    /// Records a successful manual upload: increments `document_count` by
    /// one immediately (spec §4.7.6).
    pub async fn record_manual_upload(&self, knowledge_base_id: &KnowledgeBaseId) -> Result<()> {
        self.counters.adjust_document_count(knowledge_base_id, 1).await
    }

    /// Deletes a manually uploaded document, adjusting both counters by the
    /// negative of the captured values. Feed-ingested documents must be
    /// deleted via the owning feed's lifecycle instead (spec §4.7.6).
    pub async fn delete_manual_upload(&self, document_id: &DocumentId) -> Result<()> {
        let Some(document) = self.documents.get(document_id).await? else {
            return Ok(());
        };
        if document.source_type.starts_with("plugin:") {
            return Err(IngestionError::DocumentNotFound(format!(
                "{document_id} is feed-ingested; delete via the owning feed"
            )));
        }
        self.documents.delete(document_id).await?;
        self.counters
            .adjust_document_count(&document.knowledge_base_id, -1)
            .await?;
        self.counters
            .adjust_chunk_count(&document.knowledge_base_id, -(document.chunk_count as i64))
            .await?;
        Ok(())
    }

    pub async fn get(&self, document_id: &DocumentId) -> Result<Option<Document>> {
        self.documents.get(document_id).await
    }

    pub async fn knowledge_base_exists(&self, id: &KnowledgeBaseId) -> Result<bool> {
        Ok(self.knowledge_bases.get(id).await?.is_some())
    }
}
