//! Stage handlers for `INGESTION_OCR` and `INGESTION_EMBED` (spec §4.7.3,
//! §4.7.4). Grounded on the teacher's `copilot-ingestion::pipeline` stage
//! trait shape (`ExtractionStage`/`ChunkingStage`), re-targeted from a
//! Pipeline-of-stages abstraction to the two independently-dequeued jobs
//! the spec describes, since each stage here commits its own status
//! transition and re-enqueues rather than running in one process.

use std::sync::Arc;

use async_trait::async_trait;
use ragcore_core::ids::{DocumentChunkId, DocumentId, KnowledgeBaseId};
use ragcore_core::models::{
    ChunkMetadata, ChunkType, Document, DocumentChunk, ExtractionMetadata, KnowledgeBase,
    ProcessingStatus,
};
use ragcore_infra::Queue;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::chunking::TextChunker;
use crate::services::KnowledgeBaseCounters;
use crate::staging::FileStagingService;
use crate::workload::{enqueue_job, WorkloadType};
use crate::{IngestionError, Result};

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>>;
    async fn upsert(&self, document: Document) -> Result<Document>;
    async fn delete(&self, id: &DocumentId) -> Result<bool>;

    /// Locates the existing document for `(knowledge_base, source_type,
    /// source_id)`, the key the idempotency rule (spec §4.7.1) keys off.
    async fn find_by_source(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        source_type: &str,
        source_id: &str,
    ) -> Result<Option<Document>>;
}

#[async_trait]
pub trait KnowledgeBaseRepository: Send + Sync {
    async fn get(&self, id: &KnowledgeBaseId) -> Result<Option<KnowledgeBase>>;
}

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Atomically replaces every chunk belonging to `document_id` (spec §4.7.4 step 3).
    async fn replace_all(&self, document_id: &DocumentId, chunks: Vec<DocumentChunk>) -> Result<()>;
}

pub struct ExtractionOutcome {
    pub text: String,
    pub metadata: ExtractionMetadata,
}

/// An `OcrMode`-aware text extractor, type-erased so stage handlers don't
/// need to be generic over a concrete OCR engine (spec §1 collaborator).
#[async_trait]
pub trait TextExtractorDyn: Send + Sync {
    async fn extract(
        &self,
        filename: &str,
        bytes: &[u8],
        use_ocr: bool,
        ocr_mode: &str,
    ) -> Result<ExtractionOutcome>;
}

#[async_trait]
pub trait EmbedderDyn: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
}

/// Everything a stage handler needs, bundled so the worker can wire real
/// adapters once and pass a single handle into both handlers.
pub struct IngestionDeps {
    pub queue: Arc<dyn Queue>,
    pub staging: Arc<FileStagingService>,
    pub documents: Arc<dyn DocumentRepository>,
    pub knowledge_bases: Arc<dyn KnowledgeBaseRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub counters: Arc<dyn KnowledgeBaseCounters>,
    pub extractor: Arc<dyn TextExtractorDyn>,
    pub embedder: Arc<dyn EmbedderDyn>,
    pub enable_document_profiling: bool,
}

#[derive(Debug, Deserialize)]
struct OcrPayload {
    document_id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
    staging_key: String,
    filename: String,
    #[serde(default)]
    ocr_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedPayload {
    document_id: DocumentId,
    knowledge_base_id: KnowledgeBaseId,
}

/// Spec §4.7.3: load, extract, persist, transition, enqueue embed.
pub async fn handle_ocr_job(deps: &IngestionDeps, payload: serde_json::Value) -> Result<()> {
    let payload: OcrPayload = serde_json::from_value(payload)
        .map_err(|e| IngestionError::ExtractionFailed(format!("malformed OCR payload: {e}")))?;

    let Some(mut document) = deps.documents.get(&payload.document_id).await? else {
        info!(document_id = %payload.document_id, "document absent at OCR time, dropping job");
        return Ok(());
    };

    if deps.knowledge_bases.get(&payload.knowledge_base_id).await?.is_none() {
        info!(knowledge_base_id = %payload.knowledge_base_id, "knowledge base gone, discarding staged file");
        let _ = deps.staging.delete(&payload.staging_key).await;
        return Ok(());
    }

    document.processing_status = ProcessingStatus::Extracting;
    deps.documents.upsert(document.clone()).await?;

    let bytes = match deps.staging.peek(&payload.staging_key).await {
        Ok(bytes) => bytes,
        Err(IngestionError::FileStagingMissing(key)) => {
            document.processing_status = ProcessingStatus::Error;
            document.processing_error = Some(format!("staged file missing: {key}"));
            deps.documents.upsert(document).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let ocr_mode = payload.ocr_mode.as_deref().unwrap_or("auto");
    let use_ocr = ocr_mode != "text_only";

    let outcome = deps
        .extractor
        .extract(&payload.filename, &bytes, use_ocr, ocr_mode)
        .await;

    match outcome {
        Ok(outcome) => {
            document.content = outcome.text;
            document.extraction = outcome.metadata;
            document.processing_status = ProcessingStatus::Embedding;
            deps.documents.upsert(document.clone()).await?;

            let mut embed_payload = serde_json::Map::new();
            embed_payload.insert("action".into(), "embed_document".into());
            embed_payload.insert("document_id".into(), serde_json::json!(document.id));
            embed_payload.insert(
                "knowledge_base_id".into(),
                serde_json::json!(document.knowledge_base_id),
            );
            enqueue_job(
                deps.queue.clone(),
                WorkloadType::IngestionEmbed,
                embed_payload,
                None,
                None,
            )
            .await?;

            if let Err(e) = deps.staging.delete(&payload.staging_key).await {
                warn!(error = %e, "best-effort staging delete after OCR failed");
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, document_id = %document.id, "OCR extraction failed");
            Err(e)
        }
    }
}

/// Spec §4.7.4: chunk, embed, replace chunks, update counters, transition.
pub async fn handle_embed_job(deps: &IngestionDeps, payload: serde_json::Value) -> Result<()> {
    let payload: EmbedPayload = serde_json::from_value(payload)
        .map_err(|e| IngestionError::EmbeddingFailed(format!("malformed embed payload: {e}")))?;

    let Some(mut document) = deps.documents.get(&payload.document_id).await? else {
        return Err(IngestionError::DocumentNotFound(payload.document_id.to_string()));
    };
    let Some(kb) = deps.knowledge_bases.get(&payload.knowledge_base_id).await? else {
        document.processing_status = ProcessingStatus::Error;
        document.processing_error = Some("knowledge base not found".to_string());
        deps.documents.upsert(document).await?;
        return Err(IngestionError::KnowledgeBaseNotFound(
            payload.knowledge_base_id.to_string(),
        ));
    };

    document.processing_status = ProcessingStatus::Embedding;
    deps.documents.upsert(document.clone()).await?;

    let chunker = TextChunker::new(kb.chunk_size, kb.chunk_overlap);
    let outputs = chunker.chunk(&document.title, &document.content, kb.title_chunk_enabled);

    let texts: Vec<String> = outputs.iter().map(|c| c.content.clone()).collect();
    let vectors = deps.embedder.embed(&texts).await?;

    let now = chrono::Utc::now();
    let mut chunks = Vec::with_capacity(outputs.len());
    let mut previous_id: Option<DocumentChunkId> = None;
    for (output, embedding) in outputs.iter().zip(vectors.into_iter()) {
        let chunk_type = if output.is_title { ChunkType::Title } else { ChunkType::Content };
        let chunk = DocumentChunk {
            id: DocumentChunkId::generate(),
            document_id: document.id.clone(),
            knowledge_base_id: document.knowledge_base_id.clone(),
            chunk_index: output.index,
            content: output.content.clone(),
            char_count: output.content.chars().count() as u64,
            word_count: output.content.split_whitespace().count() as u64,
            start_char: output.start_char,
            end_char: output.end_char,
            embedding,
            embedding_model: deps.embedder.model_name().to_string(),
            embedding_created_at: now,
            chunk_metadata: ChunkMetadata {
                chunk_type,
                extra: serde_json::Map::new(),
            },
            summary: None,
            keywords: Vec::new(),
            topics: Vec::new(),
            previous_chunk_id: previous_id.clone(),
            next_chunk_id: None,
        };
        previous_id = Some(chunk.id.clone());
        chunks.push(chunk);
    }
    // link next_chunk_id now that every id is known
    for i in 0..chunks.len().saturating_sub(1) {
        chunks[i].next_chunk_id = Some(chunks[i + 1].id.clone());
    }

    // every chunk in this batch must share one dimension, and a document
    // that has embedded before must keep its established dimension.
    let expected_dimension = if document.embedding_dimension != 0 {
        document.embedding_dimension
    } else {
        chunks.first().map(|c| c.embedding.len()).unwrap_or(0)
    };
    for chunk in &chunks {
        chunk.check_embedding_dimension(expected_dimension)?;
    }

    let word_count: u64 = chunks.iter().map(|c| c.word_count).sum();
    let character_count: u64 = chunks.iter().map(|c| c.char_count).sum();
    let chunk_count = chunks.len() as u64;
    let previous_chunk_count = document.chunk_count as i64;

    deps.chunks.replace_all(&document.id, chunks).await?;
    deps.counters
        .adjust_chunk_count(&document.knowledge_base_id, chunk_count as i64 - previous_chunk_count)
        .await?;

    document.word_count = word_count;
    document.character_count = character_count;
    document.chunk_count = chunk_count;
    document.embedding_dimension = expected_dimension;
    document.processed_at = Some(now);

    if deps.enable_document_profiling {
        document.processing_status = ProcessingStatus::Profiling;
        deps.documents.upsert(document.clone()).await?;

        let mut profile_payload = serde_json::Map::new();
        profile_payload.insert("action".into(), "profile_document".into());
        profile_payload.insert("document_id".into(), serde_json::json!(document.id));
        enqueue_job(deps.queue.clone(), WorkloadType::Profiling, profile_payload, None, None).await?;
    } else {
        document.processing_status = ProcessingStatus::Processed;
        deps.documents.upsert(document).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ragcore_core::ids::UserId;
    use ragcore_core::models::{KnowledgeBaseStatus, ProfilingStatus};
    use ragcore_infra::MemoryQueue;
    use std::collections::HashMap;

    struct FakeDocuments {
        by_id: Mutex<HashMap<String, Document>>,
    }

    #[async_trait]
    impl DocumentRepository for FakeDocuments {
        async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
            Ok(self.by_id.lock().get(id.as_str()).cloned())
        }
        async fn upsert(&self, document: Document) -> Result<Document> {
            self.by_id.lock().insert(document.id.as_str().to_string(), document.clone());
            Ok(document)
        }
        async fn delete(&self, id: &DocumentId) -> Result<bool> {
            Ok(self.by_id.lock().remove(id.as_str()).is_some())
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

    struct FakeKnowledgeBases {
        kb: KnowledgeBase,
    }
    #[async_trait]
    impl KnowledgeBaseRepository for FakeKnowledgeBases {
        async fn get(&self, id: &KnowledgeBaseId) -> Result<Option<KnowledgeBase>> {
            if *id == self.kb.id {
                Ok(Some(self.kb.clone()))
            } else {
                Ok(None)
            }
        }
    }

    struct FakeChunks;
    #[async_trait]
    impl ChunkRepository for FakeChunks {
        async fn replace_all(&self, _document_id: &DocumentId, _chunks: Vec<DocumentChunk>) -> Result<()> {
            Ok(())
        }
    }

    struct FakeEmbedder {
        dimension: usize,
    }
    #[async_trait]
    impl EmbedderDyn for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1; self.dimension]).collect())
        }
        fn model_name(&self) -> &str {
            "fake"
        }
    }

    struct FakeCounters {
        adjustments: Mutex<Vec<i64>>,
    }
    impl FakeCounters {
        fn new() -> Self {
            Self { adjustments: Mutex::new(Vec::new()) }
        }
    }
    #[async_trait]
    impl crate::services::KnowledgeBaseCounters for FakeCounters {
        async fn adjust_document_count(&self, _id: &KnowledgeBaseId, _delta: i64) -> Result<()> {
            Ok(())
        }
        async fn adjust_chunk_count(&self, _id: &KnowledgeBaseId, delta: i64) -> Result<()> {
            self.adjustments.lock().push(delta);
            Ok(())
        }
    }

    fn sample_kb() -> KnowledgeBase {
        KnowledgeBase {
            id: KnowledgeBaseId::generate(),
            name: "kb".into(),
            description: None,
            sync_enabled: true,
            embedding_model: "test-embed".into(),
            chunk_size: 512,
            chunk_overlap: 50,
            status: KnowledgeBaseStatus::Active,
            document_count: 0,
            total_chunks: 0,
            owner_id: UserId::generate(),
            rag_config: serde_json::Map::new(),
            title_chunk_enabled: true,
        }
    }

    fn sample_document(knowledge_base_id: KnowledgeBaseId) -> Document {
        Document {
            id: DocumentId::generate(),
            knowledge_base_id,
            source_type: "manual".into(),
            source_id: "src".into(),
            title: "title".into(),
            file_type: "text".into(),
            file_size: 0,
            mime_type: "text/plain".into(),
            content: "hello world, this is a test document with enough words to chunk".into(),
            content_hash: "hash".into(),
            source_hash: None,
            processing_status: ProcessingStatus::Embedding,
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
            tags: vec![],
            language: None,
            embedding_dimension: 0,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn deps_with(
        documents: Arc<FakeDocuments>,
        kb: KnowledgeBase,
        embedder: Arc<FakeEmbedder>,
        counters: Arc<FakeCounters>,
    ) -> IngestionDeps {
        IngestionDeps {
            queue: Arc::new(MemoryQueue::new()),
            staging: Arc::new(FileStagingService::new(
                Arc::new(ragcore_infra::MemoryCache::new(60)) as Arc<dyn ragcore_infra::Cache>
            )),
            documents,
            knowledge_bases: Arc::new(FakeKnowledgeBases { kb }),
            chunks: Arc::new(FakeChunks),
            counters,
            extractor: Arc::new(NoopExtractor),
            embedder,
            enable_document_profiling: false,
        }
    }

    struct NoopExtractor;
    #[async_trait]
    impl TextExtractorDyn for NoopExtractor {
        async fn extract(&self, _filename: &str, _bytes: &[u8], _use_ocr: bool, _ocr_mode: &str) -> Result<ExtractionOutcome> {
            Ok(ExtractionOutcome { text: String::new(), metadata: ExtractionMetadata::default() })
        }
    }

    #[tokio::test]
    async fn embed_stage_records_positive_chunk_count_delta() {
        let kb = sample_kb();
        let documents = Arc::new(FakeDocuments { by_id: Mutex::new(HashMap::new()) });
        let document = sample_document(kb.id.clone());
        documents.by_id.lock().insert(document.id.as_str().to_string(), document.clone());
        let counters = Arc::new(FakeCounters::new());
        let deps = deps_with(documents.clone(), kb.clone(), Arc::new(FakeEmbedder { dimension: 4 }), counters.clone());

        let payload = serde_json::json!({
            "document_id": document.id,
            "knowledge_base_id": kb.id,
        });
        handle_embed_job(&deps, payload).await.unwrap();

        let recorded = counters.adjustments.lock();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0] > 0, "first embed must record a positive chunk count delta");

        let stored = documents.by_id.lock().get(document.id.as_str()).cloned().unwrap();
        assert_eq!(stored.embedding_dimension, 4);
    }

    #[tokio::test]
    async fn embed_stage_rejects_a_dimension_change_on_re_embed() {
        let kb = sample_kb();
        let documents = Arc::new(FakeDocuments { by_id: Mutex::new(HashMap::new()) });
        let mut document = sample_document(kb.id.clone());
        document.embedding_dimension = 8;
        documents.by_id.lock().insert(document.id.as_str().to_string(), document.clone());
        let counters = Arc::new(FakeCounters::new());
        let deps = deps_with(documents, kb.clone(), Arc::new(FakeEmbedder { dimension: 4 }), counters);

        let payload = serde_json::json!({
            "document_id": document.id,
            "knowledge_base_id": kb.id,
        });
        let err = handle_embed_job(&deps, payload).await.unwrap_err();
        assert!(matches!(err, IngestionError::InvariantViolation(_)));
    }
}
