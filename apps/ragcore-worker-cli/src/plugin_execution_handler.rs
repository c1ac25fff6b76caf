//! Adapts `ragcore_plugin_host::handle_plugin_execution_job` into the
//! `JobHandler` seam, mirroring `ragcore_worker::handlers`'s adapters for
//! the ingestion/profiling entrypoints. Registered on
//! `WorkloadType::Ingestion`'s queue name, which plugin-feed scheduling is
//! the sole producer for.

use std::sync::Arc;

use async_trait::async_trait;
use ragcore_core::ids::PluginExecutionId;
use ragcore_core::models::Job;
use ragcore_infra::Queue;
use ragcore_plugin_host::{
    handle_plugin_execution_job, KbCapability, PluginExecutionRepository, PluginRegistry,
    ScheduleKnowledgeBaseResolver, SecretsCapability,
};
use ragcore_ratelimit::FixedWindowRateLimiter;
use ragcore_worker::dispatch::JobHandler;
use ragcore_worker::{Result, WorkerError};
use serde_json::Value;

pub struct PluginExecutionHandler {
    executions: Arc<dyn PluginExecutionRepository>,
    kb_resolver: Arc<dyn ScheduleKnowledgeBaseResolver>,
    registry: Arc<PluginRegistry>,
    rate_limiter: Arc<FixedWindowRateLimiter>,
    secrets: Arc<SecretsCapability>,
    kb: Arc<KbCapability>,
    queue: Arc<dyn Queue>,
    ocr_mode: String,
}

impl PluginExecutionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executions: Arc<dyn PluginExecutionRepository>,
        kb_resolver: Arc<dyn ScheduleKnowledgeBaseResolver>,
        registry: Arc<PluginRegistry>,
        rate_limiter: Arc<FixedWindowRateLimiter>,
        secrets: Arc<SecretsCapability>,
        kb: Arc<KbCapability>,
        queue: Arc<dyn Queue>,
        ocr_mode: String,
    ) -> Self {
        Self { executions, kb_resolver, registry, rate_limiter, secrets, kb, queue, ocr_mode }
    }
}

#[async_trait]
impl JobHandler for PluginExecutionHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        let execution_id = job
            .payload
            .get("execution_id")
            .and_then(Value::as_str)
            .map(PluginExecutionId::from)
            .ok_or_else(|| WorkerError::HandlerFailed("plugin execution job missing execution_id".to_string()))?;

        handle_plugin_execution_job(
            job,
            &execution_id,
            self.executions.clone(),
            self.kb_resolver.clone(),
            self.registry.clone(),
            self.rate_limiter.clone(),
            self.secrets.clone(),
            self.kb.clone(),
            self.queue.clone(),
            self.ocr_mode.clone(),
        )
        .await
        .map_err(|e| WorkerError::HandlerFailed(e.to_string()))
    }
}
