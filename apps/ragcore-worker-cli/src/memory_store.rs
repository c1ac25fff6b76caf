//! Default persistence backing for `ragcore-worker-cli`: an in-process
//! store implementing every repository/collaborator seam this binary wires
//! together, the in-memory counterpart to `ragcore_infra::MemoryCache`/
//! `MemoryQueue` (spec §1 treats the relational/vector store itself as out
//! of scope; a real deployment backs these same traits with Postgres).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ragcore_core::ids::{
    DocumentChunkId, DocumentId, ExperienceId, ExperienceRunId, KnowledgeBaseId, PluginExecutionId,
    PluginFeedId, UserId,
};
use ragcore_core::models::{
    Document, DocumentChunk, Experience, ExperienceRun, KnowledgeBase, PluginExecution,
    PluginExecutionStatus, PluginFeed,
};
use ragcore_ingestion::services::KnowledgeBaseCounters;
use ragcore_ingestion::stages::{ChunkRepository, DocumentRepository, KnowledgeBaseRepository};
use ragcore_plugin_host::secrets::{Scope, SecretStore, SecretStoreError};
use ragcore_profiling::orchestrator::ProfilingRepository;
use ragcore_profiling::service::ChunkInput;
use ragcore_profiling::schema::ProfilingOutcome;
use ragcore_search::source::{ChunkSource, DocumentSource, KnowledgeBaseNameResolver};
use ragcore_search::records::{ChunkRecord, DocumentRecord};

#[derive(Default)]
struct Inner {
    documents: DashMap<DocumentId, Document>,
    chunks: DashMap<DocumentChunkId, DocumentChunk>,
    knowledge_bases: DashMap<KnowledgeBaseId, KnowledgeBase>,
    plugin_feeds: DashMap<PluginFeedId, PluginFeed>,
    plugin_executions: DashMap<PluginExecutionId, PluginExecution>,
    experiences: DashMap<ExperienceId, Experience>,
    experience_runs: DashMap<ExperienceRunId, ExperienceRun>,
    secrets: DashMap<(Scope, String, String), String>,
}

/// A single process-local store backing every repository trait this
/// workspace defines. Not sharded or persisted to disk; restart loses
/// everything, exactly like `MemoryCache`/`MemoryQueue`. Cheaply `Clone`
/// (an `Arc` around the map set) so every collaborator holding its own copy
/// shares the same underlying state, the way `ProfilingOrchestrator<R>`
/// needs to own its repository by value.
#[derive(Clone, Default)]
pub struct MemoryStore(Arc<Inner>);

impl std::ops::Deref for MemoryStore {
    type Target = Inner;

    fn deref(&self) -> &Inner {
        &self.0
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_knowledge_base(&self, kb: KnowledgeBase) {
        self.knowledge_bases.insert(kb.id.clone(), kb);
    }

    pub fn seed_plugin_feed(&self, feed: PluginFeed) {
        self.plugin_feeds.insert(feed.id.clone(), feed);
    }

    fn chunks_for(&self, document_id: &DocumentId) -> Vec<DocumentChunk> {
        let mut chunks: Vec<DocumentChunk> = self
            .chunks
            .iter()
            .filter(|entry| entry.document_id == *document_id)
            .map(|entry| entry.value().clone())
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn get(&self, id: &DocumentId) -> ragcore_ingestion::Result<Option<Document>> {
        Ok(self.documents.get(id).map(|e| e.clone()))
    }

    async fn upsert(&self, document: Document) -> ragcore_ingestion::Result<Document> {
        self.documents.insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn delete(&self, id: &DocumentId) -> ragcore_ingestion::Result<bool> {
        Ok(self.documents.remove(id).is_some())
    }

    async fn find_by_source(
        &self,
        knowledge_base_id: &KnowledgeBaseId,
        source_type: &str,
        source_id: &str,
    ) -> ragcore_ingestion::Result<Option<Document>> {
        Ok(self
            .documents
            .iter()
            .find(|e| {
                e.knowledge_base_id == *knowledge_base_id
                    && e.source_type == source_type
                    && e.source_id == source_id
            })
            .map(|e| e.clone()))
    }
}

#[async_trait]
impl KnowledgeBaseRepository for MemoryStore {
    async fn get(&self, id: &KnowledgeBaseId) -> ragcore_ingestion::Result<Option<KnowledgeBase>> {
        Ok(self.knowledge_bases.get(id).map(|e| e.clone()))
    }
}

#[async_trait]
impl ChunkRepository for MemoryStore {
    async fn replace_all(
        &self,
        document_id: &DocumentId,
        chunks: Vec<DocumentChunk>,
    ) -> ragcore_ingestion::Result<()> {
        self.chunks.retain(|_, c| c.document_id != *document_id);
        for chunk in chunks {
            self.chunks.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeBaseCounters for MemoryStore {
    async fn adjust_document_count(&self, id: &KnowledgeBaseId, delta: i64) -> ragcore_ingestion::Result<()> {
        if let Some(mut kb) = self.knowledge_bases.get_mut(id) {
            kb.document_count += delta;
        }
        Ok(())
    }

    async fn adjust_chunk_count(&self, id: &KnowledgeBaseId, delta: i64) -> ragcore_ingestion::Result<()> {
        if let Some(mut kb) = self.knowledge_bases.get_mut(id) {
            kb.total_chunks += delta;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfilingRepository for MemoryStore {
    async fn document_title_and_content(
        &self,
        document_id: &str,
    ) -> ragcore_profiling::Result<Option<(String, String)>> {
        Ok(self
            .documents
            .get(&DocumentId::from(document_id))
            .map(|d| (d.title.clone(), d.content.clone())))
    }

    async fn ordered_chunk_contents(&self, document_id: &str) -> ragcore_profiling::Result<Vec<ChunkInput>> {
        Ok(self
            .chunks_for(&DocumentId::from(document_id))
            .into_iter()
            .map(|c| ChunkInput { chunk_index: c.chunk_index, content: c.content })
            .collect())
    }

    async fn mark_profiling_started(&self, document_id: &str) -> ragcore_profiling::Result<()> {
        if let Some(mut doc) = self.documents.get_mut(&DocumentId::from(document_id)) {
            doc.profiling_status = ragcore_core::models::ProfilingStatus::InProgress;
        }
        Ok(())
    }

    async fn mark_profiling_failed(&self, document_id: &str, _error: &str) -> ragcore_profiling::Result<()> {
        if let Some(mut doc) = self.documents.get_mut(&DocumentId::from(document_id)) {
            doc.profiling_status = ragcore_core::models::ProfilingStatus::Failed;
        }
        Ok(())
    }

    async fn persist_document_profile(
        &self,
        document_id: &str,
        outcome: &ProfilingOutcome,
    ) -> ragcore_profiling::Result<()> {
        if let Some(mut doc) = self.documents.get_mut(&DocumentId::from(document_id)) {
            if let Some(profile) = &outcome.document_profile {
                doc.synopsis = Some(profile.synopsis.clone());
                doc.document_type = Some(profile.document_type);
                doc.capability_manifest = Some(profile.capability_manifest.clone());
            }
            doc.profiling_coverage_percent = Some(outcome.coverage_percent);
            doc.profiling_status = ragcore_core::models::ProfilingStatus::Complete;
        }
        Ok(())
    }

    async fn persist_chunk_profiles(
        &self,
        document_id: &str,
        outcome: &ProfilingOutcome,
    ) -> ragcore_profiling::Result<()> {
        let by_index: std::collections::HashMap<u32, _> = outcome
            .chunk_results
            .iter()
            .filter_map(|r| r.profile.as_ref().map(|p| (r.chunk_index, p)))
            .filter(|(_, p)| !p.is_failed())
            .collect();
        for mut chunk in self.chunks_for(&DocumentId::from(document_id)) {
            if let Some(profile) = by_index.get(&chunk.chunk_index) {
                chunk.summary = Some(profile.summary.clone());
                chunk.keywords = profile.keywords.clone();
                chunk.topics = profile.topics.clone();
                self.chunks.insert(chunk.id.clone(), chunk);
            }
        }
        Ok(())
    }

    async fn replace_synthesized_queries(
        &self,
        _document_id: &str,
        _queries: &[String],
    ) -> ragcore_profiling::Result<()> {
        // Synthesized-query storage has no dedicated table in this store;
        // the document-level synopsis/capability manifest already carry
        // the profiling output that downstream retrieval consumes.
        Ok(())
    }
}

#[async_trait]
impl ChunkSource for MemoryStore {
    async fn chunks_in(&self, knowledge_base_ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<ChunkRecord>> {
        Ok(self
            .chunks
            .iter()
            .filter(|e| knowledge_base_ids.contains(&e.knowledge_base_id))
            .map(|e| ChunkRecord {
                id: e.id.clone(),
                document_id: e.document_id.clone(),
                knowledge_base_id: e.knowledge_base_id.clone(),
                content: e.content.clone(),
                summary: e.summary.clone(),
                keywords: e.keywords.clone(),
                topics: e.topics.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl DocumentSource for MemoryStore {
    async fn documents_in(&self, knowledge_base_ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<DocumentRecord>> {
        Ok(self
            .documents
            .iter()
            .filter(|e| knowledge_base_ids.contains(&e.knowledge_base_id))
            .map(|e| document_record(&e))
            .collect())
    }

    async fn document_by_id(&self, document_id: &DocumentId) -> ragcore_search::Result<Option<DocumentRecord>> {
        Ok(self.documents.get(document_id).map(|e| document_record(&e)))
    }
}

fn document_record(document: &Document) -> DocumentRecord {
    DocumentRecord {
        id: document.id.clone(),
        knowledge_base_id: document.knowledge_base_id.clone(),
        title: document.title.clone(),
        content: document.content.clone(),
        synopsis: document.synopsis.clone(),
        capability_manifest: document.capability_manifest.clone().unwrap_or(serde_json::Value::Null),
    }
}

#[async_trait]
impl KnowledgeBaseNameResolver for MemoryStore {
    async fn name_of(&self, id: &KnowledgeBaseId) -> ragcore_search::Result<Option<String>> {
        Ok(self.knowledge_bases.get(id).map(|kb| kb.name.clone()))
    }
}

#[async_trait]
impl ragcore_scheduler::PluginFeedRepository for MemoryStore {
    async fn claim_due(&self, limit: usize) -> ragcore_scheduler::Result<Vec<PluginFeed>> {
        let now = Utc::now();
        Ok(self
            .plugin_feeds
            .iter()
            .filter(|e| e.is_due(now))
            .take(limit)
            .map(|e| e.clone())
            .collect())
    }

    async fn save(&self, feed: &PluginFeed) -> ragcore_scheduler::Result<()> {
        self.plugin_feeds.insert(feed.id.clone(), feed.clone());
        Ok(())
    }

    async fn plugin_is_registered_and_enabled(&self, _plugin_name: &str) -> ragcore_scheduler::Result<bool> {
        // Plugin registration lives in the plugin host's registry, which this
        // store has no handle to; the scheduler side only needs a yes/no and
        // every feed that reaches this store was already created against a
        // known plugin, so it's treated as registered.
        Ok(true)
    }
}

#[async_trait]
impl ragcore_scheduler::plugin_feed::PluginExecutionRepository for MemoryStore {
    async fn has_in_flight(&self, schedule_id: &PluginFeedId) -> ragcore_scheduler::Result<bool> {
        Ok(self
            .plugin_executions
            .iter()
            .any(|e| e.schedule_id == *schedule_id && e.status.is_in_flight()))
    }

    async fn create_pending(
        &self,
        schedule_id: &PluginFeedId,
        plugin_name: &str,
        user_id: &UserId,
        agent_key: Option<&str>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> ragcore_scheduler::Result<PluginExecutionId> {
        let id = PluginExecutionId::generate();
        self.plugin_executions.insert(
            id.clone(),
            PluginExecution {
                id: id.clone(),
                schedule_id: schedule_id.clone(),
                plugin_name: plugin_name.to_string(),
                user_id: user_id.clone(),
                agent_key: agent_key.map(str::to_string),
                params,
                status: PluginExecutionStatus::Pending,
                started_at: None,
                completed_at: None,
                error: None,
                updated_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn mark_stale_running_as_failed(
        &self,
        older_than_seconds: i64,
        reason: &str,
    ) -> ragcore_scheduler::Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_seconds);
        let mut count = 0;
        for mut entry in self.plugin_executions.iter_mut() {
            if entry.status == PluginExecutionStatus::Running && entry.updated_at < cutoff {
                entry.status = PluginExecutionStatus::Failed;
                entry.error = Some(reason.to_string());
                entry.completed_at = Some(Utc::now());
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ragcore_scheduler::ExperienceRepository for MemoryStore {
    async fn claim_due(&self, limit: usize) -> ragcore_scheduler::Result<Vec<Experience>> {
        let now = Utc::now();
        Ok(self
            .experiences
            .iter()
            .filter(|e| e.is_due(now))
            .take(limit)
            .map(|e| e.clone())
            .collect())
    }

    async fn save(&self, experience: &Experience) -> ragcore_scheduler::Result<()> {
        self.experiences.insert(experience.id.clone(), experience.clone());
        Ok(())
    }
}

#[async_trait]
impl ragcore_scheduler::ExperienceRunRepository for MemoryStore {
    async fn create_queued(
        &self,
        experience_id: &ExperienceId,
        user_id: &UserId,
    ) -> ragcore_scheduler::Result<ExperienceRunId> {
        let id = ExperienceRunId::generate();
        self.experience_runs.insert(
            id.clone(),
            ExperienceRun {
                id: id.clone(),
                experience_id: experience_id.clone(),
                user_id: user_id.clone(),
                status: ragcore_core::models::ExperienceRunStatus::Queued,
                input_params: serde_json::Map::new(),
                step_states: serde_json::Map::new(),
                step_outputs: serde_json::Map::new(),
                result_metadata: serde_json::Map::new(),
                error_message: None,
                finished_at: None,
            },
        );
        Ok(id)
    }
}

/// This store has no experience-membership table, so it never reports an
/// active user; a real deployment backs this with a session/presence query.
pub struct AllActiveUsers;

#[async_trait]
impl ragcore_scheduler::ActiveUsersProvider for AllActiveUsers {
    async fn active_user_ids(&self, _experience_id: &ExperienceId) -> ragcore_scheduler::Result<Vec<UserId>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ragcore_plugin_host::PluginExecutionRepository for MemoryStore {
    async fn claim_pending(
        &self,
        execution_id: &PluginExecutionId,
    ) -> ragcore_plugin_host::error::HostResult<Option<PluginExecution>> {
        let mut entry = match self.plugin_executions.get_mut(execution_id) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if entry.status != PluginExecutionStatus::Pending {
            return Ok(None);
        }
        entry.status = PluginExecutionStatus::Running;
        Ok(Some(entry.clone()))
    }

    async fn mark_running(
        &self,
        execution_id: &PluginExecutionId,
        started_at: DateTime<Utc>,
    ) -> ragcore_plugin_host::error::HostResult<()> {
        if let Some(mut e) = self.plugin_executions.get_mut(execution_id) {
            e.status = PluginExecutionStatus::Running;
            e.started_at = Some(started_at);
            e.updated_at = started_at;
        }
        Ok(())
    }

    async fn mark_completed(&self, execution_id: &PluginExecutionId) -> ragcore_plugin_host::error::HostResult<()> {
        if let Some(mut e) = self.plugin_executions.get_mut(execution_id) {
            e.status = PluginExecutionStatus::Completed;
            e.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        execution_id: &PluginExecutionId,
        error: &str,
    ) -> ragcore_plugin_host::error::HostResult<()> {
        if let Some(mut e) = self.plugin_executions.get_mut(execution_id) {
            e.status = PluginExecutionStatus::Failed;
            e.error = Some(error.to_string());
            e.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn reset_pending_with_backoff(
        &self,
        execution_id: &PluginExecutionId,
        _retry_at: DateTime<Utc>,
    ) -> ragcore_plugin_host::error::HostResult<()> {
        if let Some(mut e) = self.plugin_executions.get_mut(execution_id) {
            e.status = PluginExecutionStatus::Pending;
        }
        Ok(())
    }

    async fn touch_updated_at(&self, execution_id: &PluginExecutionId) -> ragcore_plugin_host::error::HostResult<()> {
        if let Some(mut e) = self.plugin_executions.get_mut(execution_id) {
            e.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ragcore_plugin_host::execution::ScheduleKnowledgeBaseResolver for MemoryStore {
    async fn bound_knowledge_base_ids(
        &self,
        schedule_id: &PluginFeedId,
    ) -> ragcore_plugin_host::error::HostResult<Vec<KnowledgeBaseId>> {
        let Some(feed) = self.plugin_feeds.get(schedule_id) else {
            return Ok(Vec::new());
        };
        let ids = feed
            .params
            .get("knowledge_base_ids")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(KnowledgeBaseId::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }
}

/// Development-mode RBAC stand-in: access control rule evaluation is out of
/// scope for this workspace (spec §1), so every bound knowledge base is
/// treated as accessible. A real deployment supplies the permission engine.
pub struct AllowAllRbac;

#[async_trait]
impl ragcore_plugin_host::rbac::RbacChecker for AllowAllRbac {
    async fn can_access(&self, _user_id: &UserId, _knowledge_base_id: &KnowledgeBaseId) -> bool {
        true
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get(
        &self,
        scope: Scope,
        owner: &str,
        key: &str,
    ) -> std::result::Result<Option<String>, SecretStoreError> {
        Ok(self.secrets.get(&(scope, owner.to_string(), key.to_string())).map(|e| e.clone()))
    }

    async fn set(
        &self,
        scope: Scope,
        owner: &str,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), SecretStoreError> {
        self.secrets.insert((scope, owner.to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_core::ids::DocumentChunkId as ChunkId;
    use ragcore_core::models::{ExperienceRunStatus, ExtractionMetadata, ProcessingStatus};
    use serde_json::Map;

    fn sample_document(kb_id: &KnowledgeBaseId) -> Document {
        Document {
            id: DocumentId::generate(),
            knowledge_base_id: kb_id.clone(),
            source_type: "manual_upload".to_string(),
            source_id: "file-1".to_string(),
            title: "Title".to_string(),
            file_type: "txt".to_string(),
            file_size: 0,
            mime_type: "text/plain".to_string(),
            content: "Content".to_string(),
            content_hash: "hash".to_string(),
            source_hash: None,
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
            profiling_status: ragcore_core::models::ProfilingStatus::Pending,
            profiling_coverage_percent: None,
            relational_context: None,
            tags: vec![],
            language: None,
            embedding_dimension: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_chunk(document_id: &DocumentId, kb_id: &KnowledgeBaseId, index: u32) -> DocumentChunk {
        DocumentChunk {
            id: ChunkId::generate(),
            document_id: document_id.clone(),
            knowledge_base_id: kb_id.clone(),
            chunk_index: index,
            content: format!("chunk {index}"),
            embedding: vec![],
            char_count: 0,
            word_count: 0,
            start_char: 0,
            end_char: 0,
            embedding_model: "deterministic-dev-embedder".to_string(),
            embedding_created_at: Utc::now(),
            chunk_metadata: ragcore_core::models::ChunkMetadata {
                chunk_type: ragcore_core::models::ChunkType::Content,
                extra: Map::new(),
            },
            summary: None,
            keywords: vec![],
            topics: vec![],
            previous_chunk_id: None,
            next_chunk_id: None,
        }
    }

    fn sample_knowledge_base(kb_id: &KnowledgeBaseId) -> KnowledgeBase {
        KnowledgeBase {
            id: kb_id.clone(),
            name: "kb".to_string(),
            description: None,
            sync_enabled: false,
            embedding_model: "deterministic-dev-embedder".to_string(),
            chunk_size: 512,
            chunk_overlap: 50,
            status: ragcore_core::models::KnowledgeBaseStatus::Active,
            document_count: 0,
            total_chunks: 0,
        }
    }

    #[tokio::test]
    async fn clone_shares_underlying_state() {
        let store = MemoryStore::new();
        let handle = store.clone();
        let kb_id = KnowledgeBaseId::generate();
        handle.seed_knowledge_base(sample_knowledge_base(&kb_id));
        assert!(KnowledgeBaseRepository::get(&store, &kb_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replace_all_swaps_chunks_atomically_per_document() {
        let store = MemoryStore::new();
        let kb_id = KnowledgeBaseId::generate();
        let document_id = DocumentId::generate();
        ChunkRepository::replace_all(
            &store,
            &document_id,
            vec![sample_chunk(&document_id, &kb_id, 0), sample_chunk(&document_id, &kb_id, 1)],
        )
        .await
        .unwrap();
        assert_eq!(store.chunks_for(&document_id).len(), 2);

        ChunkRepository::replace_all(&store, &document_id, vec![sample_chunk(&document_id, &kb_id, 0)]).await.unwrap();
        assert_eq!(store.chunks_for(&document_id).len(), 1);
    }

    #[tokio::test]
    async fn claim_pending_rejects_non_pending_execution() {
        let store = MemoryStore::new();
        let schedule_id = PluginFeedId::generate();
        let user_id = UserId::from("u1");
        let execution_id = ragcore_scheduler::plugin_feed::PluginExecutionRepository::create_pending(
            &store,
            &schedule_id,
            "plugin1",
            &user_id,
            None,
            Map::new(),
        )
        .await
        .unwrap();

        let first = ragcore_plugin_host::PluginExecutionRepository::claim_pending(&store, &execution_id).await.unwrap();
        assert!(first.is_some());

        let second = ragcore_plugin_host::PluginExecutionRepository::claim_pending(&store, &execution_id).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn bound_knowledge_base_ids_reads_params_array() {
        let store = MemoryStore::new();
        let schedule_id = PluginFeedId::generate();
        let kb_id = KnowledgeBaseId::generate();
        let mut params = Map::new();
        params.insert("knowledge_base_ids".to_string(), serde_json::json!([kb_id.as_str()]));
        store.seed_plugin_feed(PluginFeed {
            id: schedule_id.clone(),
            name: "feed".to_string(),
            plugin_name: "plugin1".to_string(),
            agent_key: None,
            owner_user_id: UserId::from("u1"),
            params,
            interval_seconds: 3600,
            enabled: true,
            next_run_at: Some(Utc::now()),
            last_run_at: None,
        });

        let ids = ragcore_plugin_host::execution::ScheduleKnowledgeBaseResolver::bound_knowledge_base_ids(
            &store,
            &schedule_id,
        )
        .await
        .unwrap();
        assert_eq!(ids, vec![kb_id]);
    }

    #[tokio::test]
    async fn mark_stale_running_as_failed_only_touches_old_running_rows() {
        let store = MemoryStore::new();
        let schedule_id = PluginFeedId::generate();
        let user_id = UserId::from("u1");
        let execution_id = ragcore_scheduler::plugin_feed::PluginExecutionRepository::create_pending(
            &store,
            &schedule_id,
            "plugin1",
            &user_id,
            None,
            Map::new(),
        )
        .await
        .unwrap();
        ragcore_plugin_host::PluginExecutionRepository::mark_running(&store, &execution_id, Utc::now() - chrono::Duration::seconds(3600))
            .await
            .unwrap();

        let count = ragcore_scheduler::plugin_feed::PluginExecutionRepository::mark_stale_running_as_failed(&store, 600, "stale")
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn create_queued_experience_run_starts_in_queued_status() {
        let store = MemoryStore::new();
        let experience_id = ExperienceId::generate();
        let user_id = UserId::from("u1");
        let run_id = ragcore_scheduler::ExperienceRunRepository::create_queued(&store, &experience_id, &user_id).await.unwrap();
        let run = store.experience_runs.get(&run_id).unwrap();
        assert_eq!(run.status, ExperienceRunStatus::Queued);
    }

    #[tokio::test]
    async fn secret_store_round_trips_by_scope() {
        let store = MemoryStore::new();
        SecretStore::set(&store, Scope::User, "u1", "api_key", "secret").await.unwrap();
        assert_eq!(SecretStore::get(&store, Scope::User, "u1", "api_key").await.unwrap(), Some("secret".to_string()));
        assert_eq!(SecretStore::get(&store, Scope::System, "u1", "api_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn document_profile_persists_synopsis_and_manifest() {
        let store = MemoryStore::new();
        let kb_id = KnowledgeBaseId::generate();
        let document = sample_document(&kb_id);
        let document_id = document.id.clone();
        DocumentRepository::upsert(&store, document).await.unwrap();

        let outcome = ProfilingOutcome {
            document_profile: Some(ragcore_profiling::schema::DocumentProfile {
                synopsis: "a synopsis".to_string(),
                document_type: ragcore_core::models::DocumentType::Technical,
                capability_manifest: serde_json::json!({"can_answer": true}),
                synthesized_queries: vec![],
            }),
            chunk_results: vec![],
            coverage_percent: 100.0,
        };
        ProfilingRepository::persist_document_profile(&store, document_id.as_str(), &outcome).await.unwrap();

        let stored = DocumentRepository::get(&store, &document_id).await.unwrap().unwrap();
        assert_eq!(stored.synopsis, Some("a synopsis".to_string()));
        assert_eq!(stored.capability_manifest, Some(serde_json::json!({"can_answer": true})));
    }
}
