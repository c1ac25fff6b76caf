//! Adapts the ingestion and profiling entrypoints built in their own
//! crates into the `JobHandler` seam this crate's dispatch table expects.

use std::sync::Arc;

use async_trait::async_trait;
use ragcore_core::models::Job;
use ragcore_ingestion::{handle_embed_job, handle_ocr_job, IngestionDeps};
use ragcore_profiling::{ProfilingOrchestrator, ProfilingRepository};
use serde_json::Value;

use crate::dispatch::JobHandler;
use crate::{Result, WorkerError};

fn payload_as_value(job: &Job) -> Value {
    Value::Object(job.payload.clone())
}

pub struct IngestionOcrHandler {
    deps: Arc<IngestionDeps>,
}

impl IngestionOcrHandler {
    pub fn new(deps: Arc<IngestionDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for IngestionOcrHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        handle_ocr_job(&self.deps, payload_as_value(job)).await?;
        Ok(())
    }
}

pub struct IngestionEmbedHandler {
    deps: Arc<IngestionDeps>,
}

impl IngestionEmbedHandler {
    pub fn new(deps: Arc<IngestionDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for IngestionEmbedHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        handle_embed_job(&self.deps, payload_as_value(job)).await?;
        Ok(())
    }
}

pub struct ProfilingHandler<R: ProfilingRepository + 'static> {
    orchestrator: Arc<ProfilingOrchestrator<R>>,
}

impl<R: ProfilingRepository + 'static> ProfilingHandler<R> {
    pub fn new(orchestrator: Arc<ProfilingOrchestrator<R>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<R: ProfilingRepository + 'static> JobHandler for ProfilingHandler<R> {
    async fn handle(&self, job: &Job) -> Result<()> {
        let document_id = job
            .payload
            .get("document_id")
            .and_then(Value::as_str)
            .ok_or_else(|| WorkerError::HandlerFailed("profiling job missing document_id".to_string()))?;
        self.orchestrator.run_for_document(document_id).await?;
        Ok(())
    }
}
