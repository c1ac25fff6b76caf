//! Profile result shapes (spec §4.8). Grounded on the original backend's
//! `schemas/profiling.py` (`ChunkProfileResult`, `ProfilingResult`), adapted
//! to drop the DB-session-aware fields the orchestrator owns instead.

use ragcore_core::models::DocumentType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkProfile {
    pub summary: String,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
}

impl ChunkProfile {
    /// Spec §4.8 step 2: "a chunk result is considered failed if `summary`
    /// is empty or missing".
    pub fn is_failed(&self) -> bool {
        self.summary.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChunkProfileResult {
    pub chunk_index: u32,
    pub profile: Option<ChunkProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProfile {
    pub synopsis: String,
    pub document_type: DocumentType,
    pub capability_manifest: serde_json::Value,
    pub synthesized_queries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProfilingOutcome {
    pub document_profile: Option<DocumentProfile>,
    pub chunk_results: Vec<ChunkProfileResult>,
    pub coverage_percent: f64,
}
