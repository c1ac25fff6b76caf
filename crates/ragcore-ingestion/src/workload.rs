//! Workload Router (C6, spec §4.3): a fixed enum-to-queue mapping so
//! business code never names queues directly. Grounded on the teacher's
//! `copilot-infrastructure` task-queue naming, generalized to the six
//! workload types and default retry/visibility settings from spec §6.

use std::sync::Arc;

use ragcore_core::ids::JobId;
use ragcore_core::models::Job;
use ragcore_infra::Queue;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkloadType {
    Ingestion,
    IngestionOcr,
    IngestionEmbed,
    LlmWorkflow,
    Maintenance,
    Profiling,
}

impl WorkloadType {
    fn value(self) -> &'static str {
        match self {
            WorkloadType::Ingestion => "ingestion",
            WorkloadType::IngestionOcr => "ingestion_ocr",
            WorkloadType::IngestionEmbed => "ingestion_embed",
            WorkloadType::LlmWorkflow => "llm_workflow",
            WorkloadType::Maintenance => "maintenance",
            WorkloadType::Profiling => "profiling",
        }
    }

    /// Queue names are `shu:<workload_value>` (spec §6).
    pub fn queue_name(self) -> String {
        format!("shu:{}", self.value())
    }

    /// `(max_attempts, visibility_timeout_seconds)` defaults per spec §6's
    /// payload-schema table.
    pub fn defaults(self) -> (u32, u64) {
        match self {
            WorkloadType::Ingestion => (3, 3600),
            WorkloadType::IngestionOcr => (3, 600),
            WorkloadType::IngestionEmbed => (3, 300),
            WorkloadType::LlmWorkflow => (3, 600),
            WorkloadType::Profiling => (5, 600),
            WorkloadType::Maintenance => (1, 600),
        }
    }
}

/// The only supported entry point for placing work on a queue (spec §4.3).
/// `max_attempts`/`visibility_timeout` override the workload type's defaults
/// when the caller passes `Some`.
pub async fn enqueue_job(
    queue: Arc<dyn Queue>,
    workload_type: WorkloadType,
    payload: serde_json::Map<String, serde_json::Value>,
    max_attempts: Option<u32>,
    visibility_timeout_seconds: Option<u64>,
) -> Result<JobId> {
    let (default_attempts, default_visibility) = workload_type.defaults();
    let job = Job::new(
        workload_type.queue_name(),
        payload,
        max_attempts.unwrap_or(default_attempts),
        visibility_timeout_seconds.unwrap_or(default_visibility),
    );
    let job_id = job.id.clone();
    queue.enqueue(job).await?;
    Ok(job_id)
}
