//! Shared data model (spec §3). All timestamps are UTC.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{ErrorEnvelope, ErrorKind};
use crate::ids::{
    DocumentChunkId, DocumentId, DocumentQueryId, ExperienceId, ExperienceRunId, JobId,
    KnowledgeBaseId, PluginExecutionId, PluginFeedId, UserId,
};

/// An in-flight unit of work leased from a queue (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue_name: String,
    pub payload: serde_json::Map<String, Json>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub visibility_timeout_seconds: u64,
    pub enqueued_at: DateTime<Utc>,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        queue_name: impl Into<String>,
        payload: serde_json::Map<String, Json>,
        max_attempts: u32,
        visibility_timeout_seconds: u64,
    ) -> Self {
        Self {
            id: JobId::generate(),
            queue_name: queue_name.into(),
            payload,
            attempts: 0,
            max_attempts,
            visibility_timeout_seconds,
            enqueued_at: Utc::now(),
            last_delivered_at: None,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Extracting,
    Embedding,
    Profiling,
    Processed,
    Error,
}

impl ProcessingStatus {
    /// Whether this status has no outgoing transitions (spec §4.7.2, §8 property 3).
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingStatus::Processed | ProcessingStatus::Error)
    }

    /// Validates a transition against the state machine in spec §4.7.2:
    /// forward along PENDING -> EXTRACTING -> EMBEDDING -> PROFILING -> PROCESSED,
    /// ERROR from any non-terminal state, or a lateral re-enter into EMBEDDING.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        if next == Error {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, Embedding)
                | (Embedding, Profiling)
                | (Embedding, Processed)
                | (Profiling, Processed)
                | (Embedding, Embedding)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Narrative,
    Transactional,
    Technical,
    Conversational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilingStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    pub method: Option<String>,
    pub engine: Option<String>,
    pub confidence: Option<f64>,
    pub duration_ms: Option<u64>,
    pub metadata: serde_json::Map<String, Json>,
}

impl Default for ExtractionMetadata {
    fn default() -> Self {
        Self {
            method: None,
            engine: None,
            confidence: None,
            duration_ms: None,
            metadata: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    /// Free-form label; plugin-ingested documents use the form `"plugin:<plugin_name>"`.
    pub source_type: String,
    /// Unique per `(knowledge_base_id, source_type)`.
    pub source_id: String,
    pub title: String,
    pub file_type: String,
    pub file_size: u64,
    pub mime_type: String,
    pub content: String,
    /// SHA-256 of `content`, hex-encoded.
    pub content_hash: String,
    /// Optional provider-supplied hash (e.g. md5/etag), preferred over `content_hash` when present on both sides.
    pub source_hash: Option<String>,
    pub processing_status: ProcessingStatus,
    pub processing_error: Option<String>,
    pub extraction: ExtractionMetadata,
    pub source_url: Option<String>,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub word_count: u64,
    pub character_count: u64,
    pub chunk_count: u64,
    pub synopsis: Option<String>,
    pub synopsis_embedding: Option<Vec<f32>>,
    pub document_type: Option<DocumentType>,
    pub capability_manifest: Option<Json>,
    pub profiling_status: ProfilingStatus,
    pub profiling_coverage_percent: Option<f64>,
    pub relational_context: Option<Json>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub embedding_dimension: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A document that is in `error` status with a matching hash to `hash`
    /// is only eligible for the idempotency skip if the hash actually
    /// matches; this helper centralizes the "matching" half of spec §4.7.1
    /// and testable property 7.
    pub fn hash_matches(&self, content_hash: &str, source_hash: Option<&str>) -> bool {
        match (self.source_hash.as_deref(), source_hash) {
            (Some(existing), Some(incoming)) => existing == incoming,
            _ => self.content_hash == content_hash,
        }
    }

    /// Whether an idempotent re-ingest should be skipped (spec §4.7.1, testable property 7).
    pub fn eligible_for_hash_skip(
        &self,
        content_hash: &str,
        source_hash: Option<&str>,
        force_reingest: bool,
    ) -> bool {
        !force_reingest
            && self.hash_matches(content_hash, source_hash)
            && matches!(
                self.processing_status,
                ProcessingStatus::Processed | ProcessingStatus::Error
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Title,
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_type: ChunkType,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: DocumentChunkId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Vec<f32>,
    pub char_count: u64,
    pub word_count: u64,
    pub start_char: u64,
    pub end_char: u64,
    pub embedding_model: String,
    pub embedding_created_at: DateTime<Utc>,
    pub chunk_metadata: ChunkMetadata,
    pub summary: Option<String>,
    pub keywords: Vec<String>,
    pub topics: Vec<String>,
    pub previous_chunk_id: Option<DocumentChunkId>,
    pub next_chunk_id: Option<DocumentChunkId>,
}

impl DocumentChunk {
    /// A chunk's embedding must have the same dimension as the document's
    /// established dimension. A mismatch means the embedding model was
    /// changed after documents were indexed.
    pub fn check_embedding_dimension(&self, expected: usize) -> Result<(), ErrorEnvelope> {
        if self.embedding.len() != expected {
            return Err(ErrorEnvelope::new(
                ErrorKind::InvariantViolation,
                format!(
                    "embedding dimension mismatch: chunk has {} dimensions, expected {}. \
                     This usually indicates the embedding model was changed after documents \
                     were indexed. Re-index the knowledge base to fix this.",
                    self.embedding.len(),
                    expected
                ),
            )
            .with_detail("chunk_id", self.id.to_string())
            .with_detail("expected_dimension", expected as u64)
            .with_detail("actual_dimension", self.embedding.len() as u64));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub id: DocumentQueryId,
    pub document_id: DocumentId,
    pub knowledge_base_id: KnowledgeBaseId,
    pub query_text: String,
    pub query_embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentParticipant {
    pub id: String,
    pub document_id: DocumentId,
    pub entity_name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentProject {
    pub id: String,
    pub document_id: DocumentId,
    pub project_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeBaseStatus {
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: KnowledgeBaseId,
    pub name: String,
    pub description: Option<String>,
    pub sync_enabled: bool,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub status: KnowledgeBaseStatus,
    pub document_count: i64,
    pub total_chunks: i64,
    pub owner_id: UserId,
    pub rag_config: serde_json::Map<String, Json>,
    pub title_chunk_enabled: bool,
}

impl KnowledgeBase {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunk_overlap ({}) must be < chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginFeed {
    pub id: PluginFeedId,
    pub name: String,
    pub plugin_name: String,
    pub agent_key: Option<String>,
    pub owner_user_id: UserId,
    pub params: serde_json::Map<String, Json>,
    pub interval_seconds: u64,
    pub enabled: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl PluginFeed {
    /// Advances `last_run_at`/`next_run_at` the way `schedule.schedule_next()` does (spec §4.9).
    pub fn schedule_next(&mut self, now: DateTime<Utc>) {
        self.last_run_at = Some(now);
        self.next_run_at = Some(now + chrono::Duration::seconds(self.interval_seconds as i64));
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run_at.map(|t| t <= now).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl PluginExecutionStatus {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            PluginExecutionStatus::Pending | PluginExecutionStatus::Running
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginExecution {
    pub id: PluginExecutionId,
    pub schedule_id: PluginFeedId,
    pub plugin_name: String,
    pub user_id: UserId,
    pub agent_key: Option<String>,
    pub params: serde_json::Map<String, Json>,
    pub status: PluginExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Advanced by the worker heartbeat every 60s (spec §4.6, §4.9 staleness signal).
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Scheduled,
    Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceVisibility {
    Draft,
    Published,
    AdminOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: ExperienceId,
    pub name: String,
    pub trigger_type: TriggerType,
    pub trigger_config: serde_json::Map<String, Json>,
    pub visibility: ExperienceVisibility,
    pub steps: Vec<Json>,
    pub model_configuration_id: Option<String>,
    pub created_by: UserId,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Experience {
    pub fn is_schedulable(&self) -> bool {
        matches!(self.trigger_type, TriggerType::Scheduled | TriggerType::Cron)
            && matches!(
                self.visibility,
                ExperienceVisibility::Published | ExperienceVisibility::AdminOnly
            )
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_schedulable() && self.next_run_at.map(|t| t <= now).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceRun {
    pub id: ExperienceRunId,
    pub experience_id: ExperienceId,
    pub user_id: UserId,
    pub status: ExperienceRunStatus,
    pub input_params: serde_json::Map<String, Json>,
    pub step_states: serde_json::Map<String, Json>,
    pub step_outputs: serde_json::Map<String, Json>,
    pub result_metadata: serde_json::Map<String, Json>,
    pub error_message: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A resolved, already-authenticated identity handed into the core from the
/// (out-of-scope) auth layer (spec §1: "the core consumes a resolved user
/// identity and set of permitted knowledge bases").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub user_id: UserId,
    pub permitted_knowledge_bases: Vec<KnowledgeBaseId>,
    pub extra: HashMap<String, Json>,
}
