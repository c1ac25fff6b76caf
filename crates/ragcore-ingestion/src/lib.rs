//! Document ingestion pipeline: file staging (C4), workload routing (C6),
//! stage handlers (C7), entry points (C12), and the glue services around
//! documents and knowledge bases (C13).

pub mod chunking;
pub mod entrypoints;
pub mod maintenance;
pub mod services;
pub mod staging;
pub mod stages;
pub mod workload;

pub use chunking::{ChunkOutput, TextChunker};
pub use entrypoints::{ingest_document, ingest_email, ingest_text, ingest_thread, IngestRequest};
pub use staging::FileStagingService;
pub use stages::{handle_embed_job, handle_ocr_job, IngestionDeps};
pub use workload::{enqueue_job, WorkloadType};

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("knowledge base not found: {0}")]
    KnowledgeBaseNotFound(String),

    #[error("staged file missing for key {0}")]
    FileStagingMissing(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("content type mismatch: declared {declared}, detected {detected}")]
    ContentTypeMismatch { declared: String, detected: String },

    #[error("invalid document type: {0}")]
    InvalidDocumentType(String),

    #[error(transparent)]
    InvariantViolation(#[from] ragcore_core::error::ErrorEnvelope),

    #[error(transparent)]
    Queue(#[from] ragcore_infra::QueueError),

    #[error(transparent)]
    Cache(#[from] ragcore_infra::CacheError),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
