//! The `kb.*` capability surface (spec §4.10): thin wrappers around the
//! §4.7 ingestion entry points and the §4.11 search evaluator, with the
//! plugin/user fixed from context and RBAC re-verified on every search call.

use std::sync::Arc;

use ragcore_core::ids::{DocumentId, KnowledgeBaseId};
use ragcore_ingestion::stages::{ChunkRepository, DocumentRepository, EmbedderDyn};
use ragcore_ingestion::staging::FileStagingService;
use ragcore_ingestion::services::KnowledgeBaseCounters;
use ragcore_ingestion::{entrypoints, IngestRequest};
use ragcore_infra::Queue;
use ragcore_search::{ChunkHit, DocumentHit, SearchPage, SearchService, SortOrder, PAGE_SIZE};

use crate::context::PluginContext;
use crate::error::{CapabilityError, Result};
use crate::knowledge_object::KnowledgeObject;
use crate::limits::check_page_size;
use crate::rbac::RbacChecker;

/// Everything `kb.*` needs, bundled the way `ragcore_ingestion::IngestionDeps`
/// bundles the stage handlers' dependencies.
pub struct KbCapability {
    pub documents: Arc<dyn DocumentRepository>,
    pub staging: Arc<FileStagingService>,
    pub queue: Arc<dyn Queue>,
    pub embedder: Arc<dyn EmbedderDyn>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub counters: Arc<dyn KnowledgeBaseCounters>,
    pub search: Arc<SearchService>,
    pub rbac: Arc<dyn RbacChecker>,
    pub enable_document_profiling: bool,
}

impl KbCapability {
    fn ingest_request(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        source_id: String,
        title: String,
    ) -> Result<IngestRequest> {
        ctx.require_bound(&knowledge_base_id)?;
        Ok(IngestRequest {
            knowledge_base_id,
            plugin_name: Some(ctx.plugin_name().to_string()),
            user_id: ctx.user_id().as_str().to_string(),
            source_id,
            title,
            source_hash: None,
            force_reingest: false,
        })
    }

    /// `kb.ingest` for binary uploads (spec §4.7.1/§4.10).
    #[allow(clippy::too_many_arguments)]
    pub async fn ingest_document(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        source_id: String,
        title: String,
        bytes: Vec<u8>,
        filename: String,
        mime_type: String,
    ) -> Result<DocumentId> {
        let req = self.ingest_request(ctx, knowledge_base_id, source_id, title)?;
        entrypoints::ingest_document(
            self.documents.clone(),
            self.staging.clone(),
            self.queue.clone(),
            req,
            bytes,
            filename,
            mime_type,
            Some(ctx.ocr_mode().to_string()),
        )
        .await
        .map_err(CapabilityError::from)
    }

    /// `kb.ingest` for already-extracted text.
    pub async fn ingest_text(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        source_id: String,
        title: String,
        content: String,
    ) -> Result<DocumentId> {
        let req = self.ingest_request(ctx, knowledge_base_id, source_id, title)?;
        entrypoints::ingest_text(self.documents.clone(), self.queue.clone(), req, content)
            .await
            .map_err(CapabilityError::from)
    }

    /// `kb.ingest` for a conversation thread.
    pub async fn ingest_thread(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        thread_id: String,
        title: String,
        content: String,
    ) -> Result<DocumentId> {
        let req = self.ingest_request(ctx, knowledge_base_id, thread_id.clone(), title)?;
        entrypoints::ingest_thread(self.documents.clone(), self.queue.clone(), req, thread_id, content)
            .await
            .map_err(CapabilityError::from)
    }

    /// `kb.upsert_knowledge_object` (spec §4.10): deterministic id, KO -> Document
    /// mapping, then delegates to the text ingest path.
    pub async fn upsert_knowledge_object(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        ko: KnowledgeObject,
    ) -> Result<DocumentId> {
        let id = ko.resolve_id(ctx.plugin_name(), ctx.user_id().as_str());
        let title = ko.title.clone().unwrap_or_else(|| id.clone());
        let req = self.ingest_request(ctx, knowledge_base_id, id, title)?;
        entrypoints::ingest_text(self.documents.clone(), self.queue.clone(), req, ko.content)
            .await
            .map_err(CapabilityError::from)
    }

    /// `kb.delete_ko`: only permitted while running inside a feed, deletes
    /// are scoped to the feed's bound KBs (spec §4.10).
    pub async fn delete_ko(&self, ctx: &PluginContext, external_id: &str) -> Result<bool> {
        ctx.require_feed_scope()?;
        let source_type = ctx.source_type_label();
        for knowledge_base_id in ctx.knowledge_base_ids() {
            let found = self
                .documents
                .find_by_source(knowledge_base_id, &source_type, external_id)
                .await
                .map_err(CapabilityError::from)?;
            if let Some(document) = found {
                self.documents.delete(&document.id).await.map_err(CapabilityError::from)?;
                self.counters
                    .adjust_document_count(&document.knowledge_base_id, -1)
                    .await
                    .map_err(CapabilityError::from)?;
                self.counters
                    .adjust_chunk_count(&document.knowledge_base_id, -(document.chunk_count as i64))
                    .await
                    .map_err(CapabilityError::from)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `kb.delete_kos_batch`: deletes each id independently, returning how
    /// many were actually found and deleted.
    pub async fn delete_kos_batch(&self, ctx: &PluginContext, external_ids: &[String]) -> Result<usize> {
        ctx.require_feed_scope()?;
        let mut deleted = 0;
        for external_id in external_ids {
            if self.delete_ko(ctx, external_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Re-verifies RBAC for every bound KB before delegating to the search
    /// evaluator (spec §4.10: "re-verifies RBAC access... on every call").
    async fn verify_rbac(&self, ctx: &PluginContext) -> Result<()> {
        for knowledge_base_id in ctx.knowledge_base_ids() {
            if !self.rbac.can_access(ctx.user_id(), knowledge_base_id).await {
                return Err(CapabilityError::not_permitted(format!(
                    "access to knowledge base {knowledge_base_id} has been revoked"
                )));
            }
        }
        Ok(())
    }

    pub async fn search_chunks(
        &self,
        ctx: &PluginContext,
        field: &str,
        operator: &str,
        value: &serde_json::Value,
        page: u32,
        sort_order: SortOrder,
    ) -> Result<SearchPage<ChunkHit>> {
        self.verify_rbac(ctx).await?;
        check_page_size(PAGE_SIZE)?;
        self.search
            .search_chunks(ctx.knowledge_base_ids(), field, operator, value, page, sort_order)
            .await
            .map_err(CapabilityError::from)
    }

    pub async fn search_documents(
        &self,
        ctx: &PluginContext,
        field: &str,
        operator: &str,
        value: &serde_json::Value,
        page: u32,
        sort_order: SortOrder,
    ) -> Result<SearchPage<DocumentHit>> {
        self.verify_rbac(ctx).await?;
        check_page_size(PAGE_SIZE)?;
        self.search
            .search_documents(ctx.knowledge_base_ids(), field, operator, value, page, sort_order)
            .await
            .map_err(CapabilityError::from)
    }

    pub async fn get_document(&self, ctx: &PluginContext, document_id: &DocumentId) -> Result<DocumentHit> {
        self.verify_rbac(ctx).await?;
        self.search
            .get_document(ctx.knowledge_base_ids(), document_id)
            .await
            .map_err(CapabilityError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use ragcore_core::ids::UserId;
    use ragcore_core::models::Document;
    use ragcore_infra::MemoryQueue;
    use ragcore_ingestion::FileStagingService;
    use ragcore_infra::{Cache, MemoryCache};
    use ragcore_search::{ChunkSource, DocumentSource, KnowledgeBaseNameResolver};
    use std::collections::HashMap;

    struct FakeDocuments {
        by_id: Mutex<HashMap<String, Document>>,
    }
    impl FakeDocuments {
        fn new() -> Self {
            Self { by_id: Mutex::new(HashMap::new()) }
        }
    }
    #[async_trait]
    impl DocumentRepository for FakeDocuments {
        async fn get(&self, id: &DocumentId) -> ragcore_ingestion::Result<Option<Document>> {
            Ok(self.by_id.lock().get(id.as_str()).cloned())
        }
        async fn upsert(&self, document: Document) -> ragcore_ingestion::Result<Document> {
            self.by_id.lock().insert(document.id.as_str().to_string(), document.clone());
            Ok(document)
        }
        async fn delete(&self, id: &DocumentId) -> ragcore_ingestion::Result<bool> {
            Ok(self.by_id.lock().remove(id.as_str()).is_some())
        }
        async fn find_by_source(
            &self,
            knowledge_base_id: &KnowledgeBaseId,
            source_type: &str,
            source_id: &str,
        ) -> ragcore_ingestion::Result<Option<Document>> {
            Ok(self.by_id.lock().values().find(|d| {
                d.knowledge_base_id == *knowledge_base_id && d.source_type == source_type && d.source_id == source_id
            }).cloned())
        }
    }
    struct FakeChunks;
    #[async_trait]
    impl ChunkRepository for FakeChunks {
        async fn replace_all(&self, _document_id: &DocumentId, _chunks: Vec<ragcore_core::models::DocumentChunk>) -> ragcore_ingestion::Result<()> {
            Ok(())
        }
    }
    struct FakeEmbedder;
    #[async_trait]
    impl EmbedderDyn for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> ragcore_ingestion::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0]).collect())
        }
        fn model_name(&self) -> &str {
            "fake"
        }
    }
    struct FakeCounters;
    #[async_trait]
    impl KnowledgeBaseCounters for FakeCounters {
        async fn adjust_document_count(&self, _id: &KnowledgeBaseId, _delta: i64) -> ragcore_ingestion::Result<()> {
            Ok(())
        }
        async fn adjust_chunk_count(&self, _id: &KnowledgeBaseId, _delta: i64) -> ragcore_ingestion::Result<()> {
            Ok(())
        }
    }
    struct AllowAllRbac;
    #[async_trait]
    impl RbacChecker for AllowAllRbac {
        async fn can_access(&self, _user_id: &UserId, _kb_id: &KnowledgeBaseId) -> bool {
            true
        }
    }
    struct EmptyChunkSource;
    #[async_trait]
    impl ChunkSource for EmptyChunkSource {
        async fn chunks_in(&self, _ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<ragcore_search::ChunkRecord>> {
            Ok(vec![])
        }
    }
    struct EmptyDocumentSource;
    #[async_trait]
    impl DocumentSource for EmptyDocumentSource {
        async fn documents_in(&self, _ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<ragcore_search::DocumentRecord>> {
            Ok(vec![])
        }
        async fn document_by_id(&self, _id: &DocumentId) -> ragcore_search::Result<Option<ragcore_search::DocumentRecord>> {
            Ok(None)
        }
    }
    struct FakeKbNames;
    #[async_trait]
    impl KnowledgeBaseNameResolver for FakeKbNames {
        async fn name_of(&self, _id: &KnowledgeBaseId) -> ragcore_search::Result<Option<String>> {
            Ok(Some("kb".to_string()))
        }
    }

    fn capability() -> (KbCapability, Arc<FakeDocuments>) {
        let documents = Arc::new(FakeDocuments::new());
        let capability = KbCapability {
            documents: documents.clone(),
            staging: Arc::new(FileStagingService::new(Arc::new(MemoryCache::new(60)) as Arc<dyn Cache>)),
            queue: Arc::new(MemoryQueue::new()),
            embedder: Arc::new(FakeEmbedder),
            chunks: Arc::new(FakeChunks),
            counters: Arc::new(FakeCounters),
            search: Arc::new(SearchService::new(Arc::new(EmptyChunkSource), Arc::new(EmptyDocumentSource), Arc::new(FakeKbNames))),
            rbac: Arc::new(AllowAllRbac),
            enable_document_profiling: false,
        };
        (capability, documents)
    }

    fn ctx(schedule_id: Option<ragcore_core::ids::PluginFeedId>, kb_ids: Vec<KnowledgeBaseId>) -> PluginContext {
        PluginContext::new("acme", UserId::from("u1"), schedule_id, kb_ids, "auto")
    }

    #[tokio::test]
    async fn ingest_text_rejects_an_unbound_knowledge_base() {
        let (capability, _) = capability();
        let bound_kb = KnowledgeBaseId::from("kb1");
        let other_kb = KnowledgeBaseId::from("kb2");
        let context = ctx(None, vec![bound_kb]);
        let err = capability
            .ingest_text(&context, other_kb, "src1".to_string(), "title".to_string(), "hello".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code, "not_permitted");
    }

    #[tokio::test]
    async fn upsert_knowledge_object_is_idempotent_by_deterministic_id() {
        let (capability, documents) = capability();
        let kb_id = KnowledgeBaseId::from("kb1");
        let context = ctx(None, vec![kb_id.clone()]);
        let ko = KnowledgeObject {
            id: None,
            object_type: "note".to_string(),
            source: "crm".to_string(),
            external_id: "ext-1".to_string(),
            title: Some("Note".to_string()),
            content: "body".to_string(),
            attributes: None,
            permissions: None,
            lineage: None,
        };
        let first = capability.upsert_knowledge_object(&context, kb_id.clone(), ko.clone()).await.unwrap();
        let second = capability.upsert_knowledge_object(&context, kb_id, ko.clone()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(documents.by_id.lock().len(), 1);
    }

    #[tokio::test]
    async fn delete_ko_requires_feed_scope() {
        let (capability, _) = capability();
        let context = ctx(None, vec![KnowledgeBaseId::from("kb1")]);
        assert!(capability.delete_ko(&context, "ext-1").await.is_err());
    }
}
