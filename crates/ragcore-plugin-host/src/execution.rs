//! `_handle_plugin_execution_job` (spec §4.9/§4.10): row-locked load,
//! PENDING guard, RUNNING transition with heartbeat, invoke the plugin
//! entrypoint, commit the terminal status. Rate-limit denials are the one
//! outcome that re-sets the execution to PENDING with a backoff and
//! re-raises so the queue backend redelivers the job; any other plugin
//! failure commits as FAILED and the job itself is considered handled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragcore_core::ids::{DocumentId, KnowledgeBaseId, PluginExecutionId, PluginFeedId};
use ragcore_core::models::{Job, PluginExecution};
use ragcore_infra::Queue;
use ragcore_ratelimit::FixedWindowRateLimiter;
use ragcore_search::{ChunkHit, DocumentHit, SearchPage, SortOrder};
use ragcore_worker::heartbeat::{self, HeartbeatTarget};
use tracing::{info, warn};

use crate::context::PluginContext;
use crate::error::{HostResult, PluginHostError, Result as CapabilityResult};
use crate::kb::KbCapability;
use crate::knowledge_object::KnowledgeObject;
use crate::limits::RequestLimiter;
use crate::secrets::{Scope, SecretsCapability};

const HEARTBEAT_INTERVAL_SECONDS: u64 = 60;
const HEARTBEAT_EXTEND_SECONDS: u64 = 120;
const RATE_LIMIT_BACKOFF_SECONDS: i64 = 30;

#[async_trait]
pub trait PluginExecutionRepository: Send + Sync {
    /// Row-lock load: only returns the execution if its status is PENDING.
    async fn claim_pending(&self, execution_id: &PluginExecutionId) -> HostResult<Option<PluginExecution>>;
    async fn mark_running(&self, execution_id: &PluginExecutionId, started_at: DateTime<Utc>) -> HostResult<()>;
    async fn mark_completed(&self, execution_id: &PluginExecutionId) -> HostResult<()>;
    async fn mark_failed(&self, execution_id: &PluginExecutionId, error: &str) -> HostResult<()>;
    async fn reset_pending_with_backoff(&self, execution_id: &PluginExecutionId, retry_at: DateTime<Utc>) -> HostResult<()>;
    async fn touch_updated_at(&self, execution_id: &PluginExecutionId) -> HostResult<()>;
}

/// Resolves the bound KB list for a feed-scoped execution from the
/// schedule's `params` (spec §4.10: "scoped to the feed's KB, resolved
/// from the schedule's params").
#[async_trait]
pub trait ScheduleKnowledgeBaseResolver: Send + Sync {
    async fn bound_knowledge_base_ids(
        &self,
        schedule_id: &PluginFeedId,
    ) -> HostResult<Vec<ragcore_core::ids::KnowledgeBaseId>>;
}

/// The host surface a plugin entrypoint is invoked with — the KB, secrets,
/// and request-limiter capabilities bundled per execution.
pub struct PluginHost {
    pub kb: Arc<KbCapability>,
    pub secrets: Arc<SecretsCapability>,
    pub limiter: RequestLimiter,
}

/// A plugin entrypoint dispatches every `kb.*`/`secrets.*` call through
/// these wrappers rather than `host.kb`/`host.secrets` directly, so the
/// bulkhead (spec §6.1) actually bounds the plugin's in-flight calls.
impl PluginHost {
    #[allow(clippy::too_many_arguments)]
    pub async fn kb_ingest_document(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        source_id: String,
        title: String,
        bytes: Vec<u8>,
        filename: String,
        mime_type: String,
    ) -> CapabilityResult<DocumentId> {
        let _permit = self.limiter.acquire().await?;
        self.kb.ingest_document(ctx, knowledge_base_id, source_id, title, bytes, filename, mime_type).await
    }

    pub async fn kb_ingest_text(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        source_id: String,
        title: String,
        content: String,
    ) -> CapabilityResult<DocumentId> {
        let _permit = self.limiter.acquire().await?;
        self.kb.ingest_text(ctx, knowledge_base_id, source_id, title, content).await
    }

    pub async fn kb_ingest_thread(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        thread_id: String,
        title: String,
        content: String,
    ) -> CapabilityResult<DocumentId> {
        let _permit = self.limiter.acquire().await?;
        self.kb.ingest_thread(ctx, knowledge_base_id, thread_id, title, content).await
    }

    pub async fn kb_upsert_knowledge_object(
        &self,
        ctx: &PluginContext,
        knowledge_base_id: KnowledgeBaseId,
        ko: KnowledgeObject,
    ) -> CapabilityResult<DocumentId> {
        let _permit = self.limiter.acquire().await?;
        self.kb.upsert_knowledge_object(ctx, knowledge_base_id, ko).await
    }

    pub async fn kb_delete_ko(&self, ctx: &PluginContext, external_id: &str) -> CapabilityResult<bool> {
        let _permit = self.limiter.acquire().await?;
        self.kb.delete_ko(ctx, external_id).await
    }

    pub async fn kb_delete_kos_batch(&self, ctx: &PluginContext, external_ids: &[String]) -> CapabilityResult<usize> {
        let _permit = self.limiter.acquire().await?;
        self.kb.delete_kos_batch(ctx, external_ids).await
    }

    pub async fn kb_search_chunks(
        &self,
        ctx: &PluginContext,
        field: &str,
        operator: &str,
        value: &serde_json::Value,
        page: u32,
        sort_order: SortOrder,
    ) -> CapabilityResult<SearchPage<ChunkHit>> {
        let _permit = self.limiter.acquire().await?;
        self.kb.search_chunks(ctx, field, operator, value, page, sort_order).await
    }

    pub async fn kb_search_documents(
        &self,
        ctx: &PluginContext,
        field: &str,
        operator: &str,
        value: &serde_json::Value,
        page: u32,
        sort_order: SortOrder,
    ) -> CapabilityResult<SearchPage<DocumentHit>> {
        let _permit = self.limiter.acquire().await?;
        self.kb.search_documents(ctx, field, operator, value, page, sort_order).await
    }

    pub async fn kb_get_document(&self, ctx: &PluginContext, document_id: &DocumentId) -> CapabilityResult<DocumentHit> {
        let _permit = self.limiter.acquire().await?;
        self.kb.get_document(ctx, document_id).await
    }

    pub async fn secrets_get(&self, ctx: &PluginContext, key: &str) -> CapabilityResult<Option<String>> {
        let _permit = self.limiter.acquire().await?;
        self.secrets.get(ctx, key).await
    }

    pub async fn secrets_set(&self, ctx: &PluginContext, scope: Scope, key: &str, value: &str) -> CapabilityResult<()> {
        let _permit = self.limiter.acquire().await?;
        self.secrets.set(ctx, scope, key, value).await
    }
}

#[async_trait]
pub trait PluginEntrypoint: Send + Sync {
    async fn run(&self, ctx: &PluginContext, host: &PluginHost) -> Result<(), String>;
}

pub struct PluginRegistry {
    entrypoints: HashMap<String, Arc<dyn PluginEntrypoint>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { entrypoints: HashMap::new() }
    }

    pub fn register(&mut self, plugin_name: impl Into<String>, entrypoint: Arc<dyn PluginEntrypoint>) {
        self.entrypoints.insert(plugin_name.into(), entrypoint);
    }

    pub fn get(&self, plugin_name: &str) -> Option<Arc<dyn PluginEntrypoint>> {
        self.entrypoints.get(plugin_name).cloned()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct ExecutionHeartbeatTarget {
    repository: Arc<dyn PluginExecutionRepository>,
    execution_id: PluginExecutionId,
}

#[async_trait]
impl HeartbeatTarget for ExecutionHeartbeatTarget {
    async fn touch(&self) {
        if let Err(e) = self.repository.touch_updated_at(&self.execution_id).await {
            warn!(execution_id = %self.execution_id, error = %e, "failed to touch plugin execution heartbeat");
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_plugin_execution_job(
    job: &Job,
    execution_id: &PluginExecutionId,
    executions: Arc<dyn PluginExecutionRepository>,
    kb_resolver: Arc<dyn ScheduleKnowledgeBaseResolver>,
    registry: Arc<PluginRegistry>,
    rate_limiter: Arc<FixedWindowRateLimiter>,
    secrets: Arc<SecretsCapability>,
    kb: Arc<KbCapability>,
    queue: Arc<dyn Queue>,
    ocr_mode: String,
) -> HostResult<()> {
    let Some(execution) = executions.claim_pending(execution_id).await? else {
        info!(execution_id = %execution_id, "plugin execution already claimed or gone, skipping");
        return Ok(());
    };

    let rate_check = rate_limiter.check(&execution.plugin_name, 1, None, None).await;
    if !rate_check.allowed {
        let retry_at = Utc::now() + chrono::Duration::seconds(RATE_LIMIT_BACKOFF_SECONDS);
        executions.reset_pending_with_backoff(execution_id, retry_at).await?;
        return Err(PluginHostError::RateLimited { retry_after_seconds: rate_check.retry_after_seconds });
    }

    let Some(entrypoint) = registry.get(&execution.plugin_name) else {
        executions
            .mark_failed(execution_id, &format!("no entrypoint registered for plugin {}", execution.plugin_name))
            .await?;
        return Err(PluginHostError::UnknownPlugin(execution.plugin_name.clone()));
    };

    let started_at = Utc::now();
    executions.mark_running(execution_id, started_at).await?;

    let heartbeat_target = Arc::new(ExecutionHeartbeatTarget {
        repository: executions.clone(),
        execution_id: execution_id.clone(),
    });
    let heartbeat_handle = heartbeat::spawn(
        queue,
        job.clone(),
        heartbeat_target,
        Duration::from_secs(HEARTBEAT_INTERVAL_SECONDS),
        HEARTBEAT_EXTEND_SECONDS,
    );

    let knowledge_base_ids = kb_resolver.bound_knowledge_base_ids(&execution.schedule_id).await?;
    let context = PluginContext::new(
        execution.plugin_name.clone(),
        execution.user_id.clone(),
        Some(execution.schedule_id.clone()),
        knowledge_base_ids,
        ocr_mode,
    );
    let host = PluginHost { kb, secrets, limiter: RequestLimiter::default() };

    let outcome = entrypoint.run(&context, &host).await;
    heartbeat_handle.stop();

    match outcome {
        Ok(()) => {
            executions.mark_completed(execution_id).await?;
            info!(execution_id = %execution_id, plugin = %execution.plugin_name, "plugin execution completed");
        }
        Err(error) => {
            executions.mark_failed(execution_id, &error).await?;
            warn!(execution_id = %execution_id, plugin = %execution.plugin_name, error = %error, "plugin execution failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::KbCapability;
    use crate::secrets::{Scope, SecretStore, SecretStoreError};
    use parking_lot::Mutex;
    use ragcore_core::ids::{KnowledgeBaseId, UserId};
    use ragcore_core::models::PluginExecutionStatus;
    use ragcore_infra::{Cache, MemoryCache, MemoryQueue};
    use ragcore_ingestion::stages::{ChunkRepository, DocumentRepository, EmbedderDyn};
    use ragcore_ingestion::services::KnowledgeBaseCounters;
    use ragcore_ratelimit::RateLimitConfig;
    use ragcore_search::{ChunkSource, DocumentSource, KnowledgeBaseNameResolver, SearchService};
    use std::collections::HashMap;

    struct FakeExecutions {
        by_id: Mutex<HashMap<String, PluginExecution>>,
    }

    fn execution(plugin_name: &str) -> PluginExecution {
        PluginExecution {
            id: PluginExecutionId::from("exec1"),
            schedule_id: PluginFeedId::from("feed1"),
            plugin_name: plugin_name.to_string(),
            user_id: UserId::from("u1"),
            agent_key: None,
            params: serde_json::Map::new(),
            status: PluginExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    impl FakeExecutions {
        fn seeded(execution: PluginExecution) -> Self {
            let mut map = HashMap::new();
            map.insert(execution.id.as_str().to_string(), execution);
            Self { by_id: Mutex::new(map) }
        }
    }

    #[async_trait]
    impl PluginExecutionRepository for FakeExecutions {
        async fn claim_pending(&self, execution_id: &PluginExecutionId) -> HostResult<Option<PluginExecution>> {
            let mut map = self.by_id.lock();
            let Some(found) = map.get(execution_id.as_str()) else { return Ok(None) };
            if found.status != PluginExecutionStatus::Pending {
                return Ok(None);
            }
            let mut claimed = found.clone();
            claimed.status = PluginExecutionStatus::Running;
            map.insert(execution_id.as_str().to_string(), claimed.clone());
            Ok(Some(found.clone()))
        }
        async fn mark_running(&self, execution_id: &PluginExecutionId, started_at: DateTime<Utc>) -> HostResult<()> {
            let mut map = self.by_id.lock();
            if let Some(e) = map.get_mut(execution_id.as_str()) {
                e.status = PluginExecutionStatus::Running;
                e.started_at = Some(started_at);
            }
            Ok(())
        }
        async fn mark_completed(&self, execution_id: &PluginExecutionId) -> HostResult<()> {
            let mut map = self.by_id.lock();
            if let Some(e) = map.get_mut(execution_id.as_str()) {
                e.status = PluginExecutionStatus::Completed;
                e.completed_at = Some(Utc::now());
            }
            Ok(())
        }
        async fn mark_failed(&self, execution_id: &PluginExecutionId, error: &str) -> HostResult<()> {
            let mut map = self.by_id.lock();
            if let Some(e) = map.get_mut(execution_id.as_str()) {
                e.status = PluginExecutionStatus::Failed;
                e.error = Some(error.to_string());
            }
            Ok(())
        }
        async fn reset_pending_with_backoff(&self, execution_id: &PluginExecutionId, _retry_at: DateTime<Utc>) -> HostResult<()> {
            let mut map = self.by_id.lock();
            if let Some(e) = map.get_mut(execution_id.as_str()) {
                e.status = PluginExecutionStatus::Pending;
            }
            Ok(())
        }
        async fn touch_updated_at(&self, execution_id: &PluginExecutionId) -> HostResult<()> {
            let mut map = self.by_id.lock();
            if let Some(e) = map.get_mut(execution_id.as_str()) {
                e.updated_at = Utc::now();
            }
            Ok(())
        }
    }

    struct FakeResolver;
    #[async_trait]
    impl ScheduleKnowledgeBaseResolver for FakeResolver {
        async fn bound_knowledge_base_ids(&self, _schedule_id: &PluginFeedId) -> HostResult<Vec<KnowledgeBaseId>> {
            Ok(vec![KnowledgeBaseId::from("kb1")])
        }
    }

    struct NoopEntrypoint;
    #[async_trait]
    impl PluginEntrypoint for NoopEntrypoint {
        async fn run(&self, _ctx: &PluginContext, _host: &PluginHost) -> Result<(), String> {
            Ok(())
        }
    }

    struct FailingEntrypoint;
    #[async_trait]
    impl PluginEntrypoint for FailingEntrypoint {
        async fn run(&self, _ctx: &PluginContext, _host: &PluginHost) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    struct FakeDocuments;
    #[async_trait]
    impl DocumentRepository for FakeDocuments {
        async fn get(&self, _id: &ragcore_core::ids::DocumentId) -> ragcore_ingestion::Result<Option<ragcore_core::models::Document>> {
            Ok(None)
        }
        async fn upsert(&self, document: ragcore_core::models::Document) -> ragcore_ingestion::Result<ragcore_core::models::Document> {
            Ok(document)
        }
        async fn delete(&self, _id: &ragcore_core::ids::DocumentId) -> ragcore_ingestion::Result<bool> {
            Ok(false)
        }
        async fn find_by_source(
            &self,
            _kb: &KnowledgeBaseId,
            _source_type: &str,
            _source_id: &str,
        ) -> ragcore_ingestion::Result<Option<ragcore_core::models::Document>> {
            Ok(None)
        }
    }
    struct FakeChunks;
    #[async_trait]
    impl ChunkRepository for FakeChunks {
        async fn replace_all(&self, _document_id: &ragcore_core::ids::DocumentId, _chunks: Vec<ragcore_core::models::DocumentChunk>) -> ragcore_ingestion::Result<()> {
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
    struct FakeRbac;
    #[async_trait]
    impl crate::rbac::RbacChecker for FakeRbac {
        async fn can_access(&self, _user_id: &UserId, _kb_id: &KnowledgeBaseId) -> bool {
            true
        }
    }
    struct FakeChunkSource;
    #[async_trait]
    impl ChunkSource for FakeChunkSource {
        async fn chunks_in(&self, _ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<ragcore_search::ChunkRecord>> {
            Ok(vec![])
        }
    }
    struct FakeDocumentSource;
    #[async_trait]
    impl DocumentSource for FakeDocumentSource {
        async fn documents_in(&self, _ids: &[KnowledgeBaseId]) -> ragcore_search::Result<Vec<ragcore_search::DocumentRecord>> {
            Ok(vec![])
        }
        async fn document_by_id(&self, _id: &ragcore_core::ids::DocumentId) -> ragcore_search::Result<Option<ragcore_search::DocumentRecord>> {
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
    struct FakeSecretStore;
    #[async_trait]
    impl SecretStore for FakeSecretStore {
        async fn get(&self, _scope: Scope, _owner: &str, _key: &str) -> Result<Option<String>, SecretStoreError> {
            Ok(None)
        }
        async fn set(&self, _scope: Scope, _owner: &str, _key: &str, _value: &str) -> Result<(), SecretStoreError> {
            Ok(())
        }
    }

    fn kb_capability() -> Arc<KbCapability> {
        Arc::new(KbCapability {
            documents: Arc::new(FakeDocuments),
            staging: Arc::new(ragcore_ingestion::FileStagingService::new(Arc::new(MemoryCache::new(60)) as Arc<dyn Cache>)),
            queue: Arc::new(MemoryQueue::new()),
            embedder: Arc::new(FakeEmbedder),
            chunks: Arc::new(FakeChunks),
            counters: Arc::new(FakeCounters),
            search: Arc::new(SearchService::new(Arc::new(FakeChunkSource), Arc::new(FakeDocumentSource), Arc::new(FakeKbNames))),
            rbac: Arc::new(FakeRbac),
            enable_document_profiling: false,
        })
    }

    fn rate_limiter(capacity: u64) -> Arc<FixedWindowRateLimiter> {
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(60));
        Arc::new(FixedWindowRateLimiter::new(cache, RateLimitConfig::new("rl:plugin", capacity, capacity as f64 / 60.0)))
    }

    fn secrets_capability(limiter: Arc<FixedWindowRateLimiter>) -> Arc<SecretsCapability> {
        Arc::new(SecretsCapability::new(Arc::new(FakeSecretStore), limiter))
    }

    #[tokio::test]
    async fn happy_path_completes_the_execution() {
        let executions: Arc<dyn PluginExecutionRepository> = Arc::new(FakeExecutions::seeded(execution("acme")));
        let mut registry = PluginRegistry::new();
        registry.register("acme", Arc::new(NoopEntrypoint));
        let limiter = rate_limiter(1000);
        let job = Job::new("shu:plugin_execution", serde_json::Map::new(), 3, 300);

        handle_plugin_execution_job(
            &job,
            &PluginExecutionId::from("exec1"),
            executions.clone(),
            Arc::new(FakeResolver),
            Arc::new(registry),
            limiter.clone(),
            secrets_capability(limiter),
            kb_capability(),
            Arc::new(MemoryQueue::new()),
            "auto".to_string(),
        )
        .await
        .unwrap();

        let stored = executions.claim_pending(&PluginExecutionId::from("exec1")).await.unwrap();
        assert!(stored.is_none(), "completed execution is no longer pending");
    }

    #[tokio::test]
    async fn rate_limited_execution_is_reset_to_pending_and_errors() {
        let executions: Arc<dyn PluginExecutionRepository> = Arc::new(FakeExecutions::seeded(execution("acme")));
        let mut registry = PluginRegistry::new();
        registry.register("acme", Arc::new(NoopEntrypoint));
        let limiter = rate_limiter(1);
        limiter.check("acme", 1, None, None).await; // exhaust the single slot
        let job = Job::new("shu:plugin_execution", serde_json::Map::new(), 3, 300);

        let result = handle_plugin_execution_job(
            &job,
            &PluginExecutionId::from("exec1"),
            executions.clone(),
            Arc::new(FakeResolver),
            Arc::new(registry),
            limiter.clone(),
            secrets_capability(limiter),
            kb_capability(),
            Arc::new(MemoryQueue::new()),
            "auto".to_string(),
        )
        .await;

        assert!(matches!(result, Err(PluginHostError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn plugin_failure_marks_the_execution_failed_without_raising() {
        let executions: Arc<dyn PluginExecutionRepository> = Arc::new(FakeExecutions::seeded(execution("acme")));
        let mut registry = PluginRegistry::new();
        registry.register("acme", Arc::new(FailingEntrypoint));
        let limiter = rate_limiter(1000);
        let job = Job::new("shu:plugin_execution", serde_json::Map::new(), 3, 300);

        handle_plugin_execution_job(
            &job,
            &PluginExecutionId::from("exec1"),
            executions,
            Arc::new(FakeResolver),
            Arc::new(registry),
            limiter.clone(),
            secrets_capability(limiter),
            kb_capability(),
            Arc::new(MemoryQueue::new()),
            "auto".to_string(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn dispatch_wrappers_release_the_limiter_after_each_call() {
        let limiter = rate_limiter(1000);
        let host = PluginHost {
            kb: kb_capability(),
            secrets: secrets_capability(limiter),
            limiter: RequestLimiter::new(1),
        };
        let ctx = PluginContext::new("acme", UserId::from("u1"), None, vec![KnowledgeBaseId::from("kb1")], "auto");

        host.kb_ingest_text(&ctx, KnowledgeBaseId::from("kb1"), "src1".to_string(), "title".to_string(), "hello".to_string())
            .await
            .unwrap();

        // a second dispatch only succeeds if the first call's permit was released
        host.kb_ingest_text(&ctx, KnowledgeBaseId::from("kb1"), "src2".to_string(), "title".to_string(), "world".to_string())
            .await
            .unwrap();
    }
}
