//! The minimal searchable shape of a chunk/document (spec §4.11's
//! searchable-field tables), plus the page/hit envelopes the service
//! returns.

use ragcore_core::ids::{DocumentChunkId, DocumentId, KnowledgeBaseId};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: DocumentChunkId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub content: String,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub title: String,
    pub content: String,
    pub synopsis: Option<String>,
    pub capability_manifest: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkHit {
    pub chunk_id: DocumentChunkId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub knowledge_base_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentHit {
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub knowledge_base_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Fixed page size (20) per spec §4.11.
pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}
