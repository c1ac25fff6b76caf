//! DB-aware coordination layer (spec §4.8 steps 1, 5). Grounded on the
//! original backend's `ProfilingOrchestrator.run_for_document`: loads the
//! document and its chunks, delegates to `ProfilingService` for the LLM
//! work, then persists results — including the "always issue the DELETE"
//! rule for synthesized queries.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::schema::ProfilingOutcome;
use crate::service::{ChunkInput, ProfilingService};
use crate::{ProfilingError, Result};

/// A read view onto chunks ordered by `chunk_index`, and the per-chunk
/// persistence calls profiling needs. Declared locally (rather than reused
/// from `ragcore-ingestion`) to keep the two crates independent; the worker
/// wires concrete adapters satisfying both.
#[async_trait]
pub trait ProfilingRepository: Send + Sync {
    async fn document_title_and_content(&self, document_id: &str) -> Result<Option<(String, String)>>;
    async fn ordered_chunk_contents(&self, document_id: &str) -> Result<Vec<ChunkInput>>;

    async fn mark_profiling_started(&self, document_id: &str) -> Result<()>;
    async fn mark_profiling_failed(&self, document_id: &str, error: &str) -> Result<()>;

    /// Persists document-level results and marks `profiling_status = complete`.
    async fn persist_document_profile(
        &self,
        document_id: &str,
        outcome: &ProfilingOutcome,
    ) -> Result<()>;

    /// Persists only chunks with a non-empty summary (spec §4.8 step 5).
    async fn persist_chunk_profiles(&self, document_id: &str, outcome: &ProfilingOutcome) -> Result<()>;

    /// Always issues the delete-then-insert, even for an empty query set,
    /// so a re-profile clears stale queries (spec §4.8 step 5).
    async fn replace_synthesized_queries(&self, document_id: &str, queries: &[String]) -> Result<()>;
}

pub struct ProfilingOrchestrator<R: ProfilingRepository> {
    repository: R,
    service: ProfilingService,
}

impl<R: ProfilingRepository> ProfilingOrchestrator<R> {
    pub fn new(repository: R, service: ProfilingService) -> Self {
        Self { repository, service }
    }

    pub async fn run_for_document(&self, document_id: &str) -> Result<ProfilingOutcome> {
        let Some((title, content)) = self.repository.document_title_and_content(document_id).await? else {
            return Err(ProfilingError::DocumentNotFound(document_id.to_string()));
        };

        self.repository.mark_profiling_started(document_id).await?;

        let chunks = self.repository.ordered_chunk_contents(document_id).await?;
        let full_text_tokens = content.len() / 4;

        let outcome = match self.service.profile(&title, full_text_tokens, &content, &chunks).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.repository.mark_profiling_failed(document_id, &e.to_string()).await?;
                return Err(e);
            }
        };

        self.repository.persist_document_profile(document_id, &outcome).await?;
        self.repository.persist_chunk_profiles(document_id, &outcome).await?;

        let queries = outcome
            .document_profile
            .as_ref()
            .map(|p| p.synthesized_queries.clone())
            .unwrap_or_default();
        // Query persistence is isolated from the rest of the pipeline (spec
        // §7): a failure here must not roll back the profile/chunk results
        // already persisted above.
        if let Err(e) = self.repository.replace_synthesized_queries(document_id, &queries).await {
            warn!(document_id = %document_id, error = %e, "failed to replace synthesized queries");
        }

        info!(
            document_id = %document_id,
            coverage_percent = outcome.coverage_percent,
            chunk_count = outcome.chunk_results.len(),
            "profiling complete"
        );

        Ok(outcome)
    }
}
