//! Ingestion Helpers (C12, spec §4.7.1/§4.12): the only sanctioned way to
//! place a document into the pipeline. Grounded on the teacher's
//! `copilot-ingestion::pipeline::Document::from_file`/`from_text`
//! constructors, re-targeted from one-shot local ingestion to the
//! stage-and-enqueue flow the spec requires, plus the shared idempotency
//! rule all four helpers apply.

use std::sync::Arc;

use chrono::Utc;
use ragcore_core::hash::sha256_hex;
use ragcore_core::ids::{DocumentId, KnowledgeBaseId};
use ragcore_core::models::{Document, ExtractionMetadata, ProcessingStatus, ProfilingStatus};

use crate::services::KnowledgeBaseCounters;
use crate::stages::{DocumentRepository, EmbedderDyn};
use crate::staging::FileStagingService;
use crate::workload::{enqueue_job, WorkloadType};
use crate::Result;
use ragcore_infra::Queue;

/// Shared fields every entry point needs; plugin-sourced calls use
/// `source_type = "plugin:<plugin>"` (spec §4.7.1/§4.10).
pub struct IngestRequest {
    pub knowledge_base_id: KnowledgeBaseId,
    pub plugin_name: Option<String>,
    pub user_id: String,
    pub source_id: String,
    pub title: String,
    pub source_hash: Option<String>,
    pub force_reingest: bool,
}

impl IngestRequest {
    fn source_type(&self) -> String {
        match &self.plugin_name {
            Some(plugin) => format!("plugin:{plugin}"),
            None => "manual".to_string(),
        }
    }
}

fn new_document(req: &IngestRequest, file_type: &str, mime_type: &str) -> Document {
    let now = Utc::now();
    Document {
        id: DocumentId::generate(),
        knowledge_base_id: req.knowledge_base_id.clone(),
        source_type: req.source_type(),
        source_id: req.source_id.clone(),
        title: req.title.clone(),
        file_type: file_type.to_string(),
        file_size: 0,
        mime_type: mime_type.to_string(),
        content: String::new(),
        content_hash: String::new(),
        source_hash: req.source_hash.clone(),
        processing_status: ProcessingStatus::Pending,
        processing_error: None,
        extraction: ExtractionMetadata::default(),
        source_url: None,
        source_modified_at: None,
        processed_at: None,
        word_count: 0,
        character_count: 0,
        chunk_count: 0,
        synopsis: None,
        synopsis_embedding: None,
        document_type: None,
        capability_manifest: None,
        profiling_status: ProfilingStatus::Pending,
        profiling_coverage_percent: None,
        relational_context: None,
        tags: Vec::new(),
        language: None,
        embedding_dimension: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Applies spec §4.7.1's shared idempotency rule: locate the existing
/// document for this source, and decide whether to skip, returning the
/// document to reuse (existing, possibly-updated, or a fresh one) plus
/// whether the caller should proceed with (re-)ingestion.
async fn resolve_idempotency(
    documents: &dyn DocumentRepository,
    req: &IngestRequest,
    content_hash: &str,
    mut fresh: Document,
) -> Result<(Document, bool)> {
    let existing = documents
        .find_by_source(&req.knowledge_base_id, &req.source_type(), &req.source_id)
        .await?;

    match existing {
        Some(existing) if existing.eligible_for_hash_skip(content_hash, req.source_hash.as_deref(), req.force_reingest) => {
            Ok((existing, false))
        }
        Some(mut existing) => {
            existing.title = fresh.title;
            existing.content_hash = content_hash.to_string();
            existing.source_hash = req.source_hash.clone();
            existing.processing_status = ProcessingStatus::Pending;
            existing.processing_error = None;
            existing.extraction = ExtractionMetadata::default();
            existing.updated_at = Utc::now();
            Ok((existing, true))
        }
        None => {
            fresh.content_hash = content_hash.to_string();
            Ok((fresh, true))
        }
    }
}

/// `ingest_document`: stages bytes, enqueues `INGESTION_OCR` (spec §4.7.1).
pub async fn ingest_document(
    documents: Arc<dyn DocumentRepository>,
    staging: Arc<FileStagingService>,
    queue: Arc<dyn Queue>,
    req: IngestRequest,
    bytes: Vec<u8>,
    filename: String,
    mime_type: String,
    ocr_mode: Option<String>,
) -> Result<DocumentId> {
    let content_hash = sha256_hex(&bytes);
    let fresh = new_document(&req, "document", &mime_type);
    let (mut document, should_process) =
        resolve_idempotency(documents.as_ref(), &req, &content_hash, fresh).await?;
    document.file_size = bytes.len() as u64;
    document.mime_type = mime_type.clone();
    let document = documents.upsert(document).await?;

    if !should_process {
        return Ok(document.id);
    }

    let staging_key = staging.stage(&document.id, &bytes).await?;

    let mut payload = serde_json::Map::new();
    payload.insert("action".into(), "extract_text".into());
    payload.insert("document_id".into(), serde_json::json!(document.id));
    payload.insert("knowledge_base_id".into(), serde_json::json!(document.knowledge_base_id));
    payload.insert("filename".into(), filename.into());
    payload.insert("mime_type".into(), mime_type.into());
    payload.insert("source_id".into(), req.source_id.into());
    payload.insert("staging_key".into(), staging_key.into());
    if let Some(mode) = ocr_mode {
        payload.insert("ocr_mode".into(), mode.into());
    }

    enqueue_job(queue, WorkloadType::IngestionOcr, payload, None, None).await?;
    Ok(document.id)
}

/// `ingest_text`: content already text, skips OCR, enqueues `INGESTION_EMBED`.
pub async fn ingest_text(
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn Queue>,
    req: IngestRequest,
    content: String,
) -> Result<DocumentId> {
    ingest_prepared_text(documents, queue, req, content, "text").await
}

/// `ingest_thread`: as `ingest_text`, with `file_type="thread"` and
/// `source_id = thread_id` (spec §4.7.1).
pub async fn ingest_thread(
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn Queue>,
    mut req: IngestRequest,
    thread_id: String,
    content: String,
) -> Result<DocumentId> {
    req.source_id = thread_id;
    ingest_prepared_text(documents, queue, req, content, "thread").await
}

async fn ingest_prepared_text(
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn Queue>,
    req: IngestRequest,
    content: String,
    file_type: &str,
) -> Result<DocumentId> {
    let content_hash = sha256_hex(content.as_bytes());
    let mut fresh = new_document(&req, file_type, "text/plain");
    fresh.content = content.clone();
    fresh.file_size = content.len() as u64;
    let (mut document, should_process) =
        resolve_idempotency(documents.as_ref(), &req, &content_hash, fresh).await?;
    document.content = content;
    let document = documents.upsert(document).await?;

    if !should_process {
        return Ok(document.id);
    }

    let mut payload = serde_json::Map::new();
    payload.insert("action".into(), "embed_document".into());
    payload.insert("document_id".into(), serde_json::json!(document.id));
    payload.insert("knowledge_base_id".into(), serde_json::json!(document.knowledge_base_id));
    enqueue_job(queue, WorkloadType::IngestionEmbed, payload, None, None).await?;
    Ok(document.id)
}

/// `ingest_email`: builds a canonical header+body string, runs embedding
/// synchronously in-request (spec §4.7.1 — "content is already text and
/// small"), then enqueues profiling if enabled.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_email(
    documents: Arc<dyn DocumentRepository>,
    queue: Arc<dyn Queue>,
    embedder: Arc<dyn EmbedderDyn>,
    chunks: Arc<dyn crate::stages::ChunkRepository>,
    counters: Arc<dyn KnowledgeBaseCounters>,
    mut req: IngestRequest,
    subject: String,
    sender: String,
    recipients: Vec<String>,
    date: chrono::DateTime<Utc>,
    message_id: String,
    thread_id: Option<String>,
    body_text: String,
    body_html: Option<String>,
    labels: Vec<String>,
    enable_document_profiling: bool,
) -> Result<DocumentId> {
    req.source_id = message_id.clone();
    req.title = subject.clone();
    let canonical = format!(
        "From: {sender}\nTo: {}\nDate: {date}\nSubject: {subject}\nMessage-Id: {message_id}\nThread-Id: {}\nLabels: {}\n\n{body_text}",
        recipients.join(", "),
        thread_id.clone().unwrap_or_default(),
        labels.join(", "),
    );
    let content_hash = sha256_hex(canonical.as_bytes());
    let mut fresh = new_document(&req, "email", "message/rfc822");
    fresh.content = canonical.clone();
    fresh.file_size = canonical.len() as u64;
    let (mut document, should_process) =
        resolve_idempotency(documents.as_ref(), &req, &content_hash, fresh).await?;
    document.content = canonical;
    if let Some(html) = body_html {
        document.tags.push(format!("html_length:{}", html.len()));
    }
    let mut document = documents.upsert(document).await?;

    if !should_process {
        return Ok(document.id);
    }

    document.processing_status = ProcessingStatus::Embedding;
    documents.upsert(document.clone()).await?;

    let chunker = crate::chunking::TextChunker::new(512, 50);
    let outputs = chunker.chunk(&document.title, &document.content, false);
    let texts: Vec<String> = outputs.iter().map(|c| c.content.clone()).collect();
    let vectors = embedder.embed(&texts).await?;

    let now = Utc::now();
    let mut document_chunks = Vec::with_capacity(outputs.len());
    for (output, embedding) in outputs.iter().zip(vectors.into_iter()) {
        document_chunks.push(ragcore_core::models::DocumentChunk {
            id: ragcore_core::ids::DocumentChunkId::generate(),
            document_id: document.id.clone(),
            knowledge_base_id: document.knowledge_base_id.clone(),
            chunk_index: output.index,
            content: output.content.clone(),
            embedding,
            char_count: output.content.chars().count() as u64,
            word_count: output.content.split_whitespace().count() as u64,
            start_char: output.start_char,
            end_char: output.end_char,
            embedding_model: embedder.model_name().to_string(),
            embedding_created_at: now,
            chunk_metadata: ragcore_core::models::ChunkMetadata {
                chunk_type: ragcore_core::models::ChunkType::Content,
                extra: serde_json::Map::new(),
            },
            summary: None,
            keywords: Vec::new(),
            topics: Vec::new(),
            previous_chunk_id: None,
            next_chunk_id: None,
        });
    }
    let expected_dimension = if document.embedding_dimension != 0 {
        document.embedding_dimension
    } else {
        document_chunks.first().map(|c| c.embedding.len()).unwrap_or(0)
    };
    for chunk in &document_chunks {
        chunk.check_embedding_dimension(expected_dimension)?;
    }

    let previous_chunk_count = document.chunk_count as i64;
    document.chunk_count = document_chunks.len() as u64;
    document.word_count = document_chunks.iter().map(|c| c.word_count).sum();
    document.character_count = document_chunks.iter().map(|c| c.char_count).sum();
    document.embedding_dimension = expected_dimension;
    document.processed_at = Some(now);
    chunks.replace_all(&document.id, document_chunks).await?;
    counters
        .adjust_chunk_count(&document.knowledge_base_id, document.chunk_count as i64 - previous_chunk_count)
        .await?;

    if enable_document_profiling {
        document.processing_status = ProcessingStatus::Profiling;
        documents.upsert(document.clone()).await?;
        let mut payload = serde_json::Map::new();
        payload.insert("action".into(), "profile_document".into());
        payload.insert("document_id".into(), serde_json::json!(document.id));
        enqueue_job(queue, WorkloadType::Profiling, payload, None, None).await?;
    } else {
        document.processing_status = ProcessingStatus::Processed;
        documents.upsert(document).await?;
    }

    Ok(document.id)
}
