//! Profiling Orchestrator (C8, spec §4.8): enriches documents and chunks
//! with synopses, classifications, capability manifests, and synthesized
//! queries, to feed re-ranking and query-match retrieval.

pub mod orchestrator;
pub mod schema;
pub mod service;

pub use orchestrator::{ProfilingOrchestrator, ProfilingRepository};
pub use schema::{ChunkProfile, ChunkProfileResult, DocumentProfile, ProfilingOutcome};
pub use service::{ChunkInput, LlmClientDyn, ProfilingConfig, ProfilingService};

#[derive(Debug, thiserror::Error)]
pub enum ProfilingError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("invalid document type: {0}")]
    InvalidDocumentType(String),

    #[error("LLM call failed: {0}")]
    LlmFailed(String),
}

pub type Result<T> = std::result::Result<T, ProfilingError>;
