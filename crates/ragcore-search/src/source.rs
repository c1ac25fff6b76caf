//! Read-only collaborator seams the search evaluator pulls candidate
//! records through, kept local and dyn-safe per this workspace's
//! established pattern for crate-seam traits.

use async_trait::async_trait;
use ragcore_core::ids::{DocumentId, KnowledgeBaseId};

use crate::error::Result;
use crate::records::{ChunkRecord, DocumentRecord};

#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn chunks_in(&self, knowledge_base_ids: &[KnowledgeBaseId]) -> Result<Vec<ChunkRecord>>;
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn documents_in(&self, knowledge_base_ids: &[KnowledgeBaseId]) -> Result<Vec<DocumentRecord>>;
    async fn document_by_id(&self, document_id: &DocumentId) -> Result<Option<DocumentRecord>>;
}

#[async_trait]
pub trait KnowledgeBaseNameResolver: Send + Sync {
    async fn name_of(&self, id: &KnowledgeBaseId) -> Result<Option<String>>;
}
