//! Two-phase batch LLM profiling algorithm (spec §4.8 steps 2-4). Grounded
//! on the original backend's `ProfilingService.profile_chunks_incremental`
//! (referenced by `profiling_orchestrator.py`, not itself present in the
//! retrieval pack — the batch-then-retry-individually shape and coverage
//! formula are taken directly from spec §4.8).

use std::time::Duration;

use async_trait::async_trait;
use ragcore_core::models::DocumentType;
use tracing::warn;

use crate::schema::{ChunkProfile, ChunkProfileResult, DocumentProfile, ProfilingOutcome};
use crate::{ProfilingError, Result};

/// A chunk's bare content, the minimal input the LLM call needs.
#[derive(Debug, Clone)]
pub struct ChunkInput {
    pub chunk_index: u32,
    pub content: String,
}

/// Type-erased LLM client so the orchestrator isn't generic over a provider
/// (spec §1 `LLMClient` collaborator, re-expressed without the associated
/// error type for dyn-safety — see `ragcore_core::traits::LLMClient`).
#[async_trait]
pub trait LlmClientDyn: Send + Sync {
    async fn complete(&self, prompt: &str, model: &str, timeout: Duration) -> Result<String>;
}

pub struct ProfilingConfig {
    pub model: String,
    pub timeout: Duration,
    pub chunk_profiling_batch_size: usize,
    pub profiling_max_input_tokens: usize,
    pub profiling_full_doc_max_tokens: usize,
}

pub struct ProfilingService {
    llm: std::sync::Arc<dyn LlmClientDyn>,
    config: ProfilingConfig,
}

impl ProfilingService {
    pub fn new(llm: std::sync::Arc<dyn LlmClientDyn>, config: ProfilingConfig) -> Self {
        Self { llm, config }
    }

    /// Spec §4.8 steps 2-3: batch-profile every chunk, then retry any
    /// failed chunk individually with adjacent-chunk context.
    async fn profile_chunks(&self, chunks: &[ChunkInput]) -> Result<(Vec<ChunkProfileResult>, f64)> {
        if chunks.is_empty() {
            return Ok((Vec::new(), 100.0));
        }

        let mut results: Vec<ChunkProfileResult> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.chunk_profiling_batch_size.max(1)) {
            let batch_results = self.profile_batch(batch).await?;
            results.extend(batch_results);
        }

        let failed_indices: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.profile.as_ref().map(|p| p.is_failed()).unwrap_or(true))
            .map(|(i, _)| i)
            .collect();

        for idx in failed_indices {
            let context = adjacent_context(chunks, idx);
            match self.profile_single(&chunks[idx], &context).await {
                Ok(profile) if !profile.is_failed() => {
                    results[idx] = ChunkProfileResult {
                        chunk_index: chunks[idx].chunk_index,
                        profile: Some(profile),
                    };
                }
                Ok(_) | Err(_) => {
                    warn!(chunk_index = chunks[idx].chunk_index, "chunk profiling retry still failed");
                }
            }
        }

        let successful = results
            .iter()
            .filter(|r| r.profile.as_ref().map(|p| !p.is_failed()).unwrap_or(false))
            .count();
        let coverage_percent = (successful as f64 / chunks.len() as f64) * 100.0;

        Ok((results, coverage_percent))
    }

    async fn profile_batch(&self, batch: &[ChunkInput]) -> Result<Vec<ChunkProfileResult>> {
        let prompt = batch_prompt(batch);
        let raw = self.llm.complete(&prompt, &self.config.model, self.config.timeout).await?;
        let parsed: Vec<ChunkProfile> = parse_batch_response(&raw, batch.len());
        Ok(batch
            .iter()
            .zip(parsed)
            .map(|(chunk, profile)| ChunkProfileResult {
                chunk_index: chunk.chunk_index,
                profile: Some(profile),
            })
            .collect())
    }

    async fn profile_single(&self, chunk: &ChunkInput, context: &str) -> Result<ChunkProfile> {
        let prompt = single_prompt(chunk, context);
        let raw = self.llm.complete(&prompt, &self.config.model, self.config.timeout).await?;
        Ok(parse_single_response(&raw))
    }

    /// Spec §4.8 step 4: document-level synopsis/classification/manifest.
    /// Large documents (> `profiling_full_doc_max_tokens`) never see
    /// full text, only the accumulated chunk summaries.
    async fn profile_document(
        &self,
        title: &str,
        full_text_tokens: usize,
        full_text: &str,
        chunk_summaries: &[String],
    ) -> Result<DocumentProfile> {
        let truncated_summaries = truncate_to_tokens(
            &chunk_summaries.join("\n"),
            self.config.profiling_max_input_tokens,
        );
        let body = if full_text_tokens <= self.config.profiling_full_doc_max_tokens {
            full_text.to_string()
        } else {
            truncated_summaries
        };

        let prompt = document_prompt(title, &body);
        let raw = self.llm.complete(&prompt, &self.config.model, self.config.timeout).await?;
        parse_document_response(&raw)
    }

    /// Orchestrates the full two-phase algorithm for one document.
    pub async fn profile(
        &self,
        title: &str,
        full_text_tokens: usize,
        full_text: &str,
        chunks: &[ChunkInput],
    ) -> Result<ProfilingOutcome> {
        let (chunk_results, coverage_percent) = self.profile_chunks(chunks).await?;
        let summaries: Vec<String> = chunk_results
            .iter()
            .filter_map(|r| r.profile.as_ref())
            .filter(|p| !p.is_failed())
            .map(|p| p.summary.clone())
            .collect();

        let document_profile = self
            .profile_document(title, full_text_tokens, full_text, &summaries)
            .await
            .ok();

        Ok(ProfilingOutcome { document_profile, chunk_results, coverage_percent })
    }
}

fn adjacent_context(chunks: &[ChunkInput], idx: usize) -> String {
    let mut parts = Vec::new();
    if idx > 0 {
        parts.push(chunks[idx - 1].content.clone());
    }
    if idx + 1 < chunks.len() {
        parts.push(chunks[idx + 1].content.clone());
    }
    parts.join("\n---\n")
}

fn batch_prompt(batch: &[ChunkInput]) -> String {
    let mut prompt = String::from(
        "Summarize each chunk below. Respond with one JSON object per chunk in order: {\"summary\":..,\"keywords\":[..],\"topics\":[..]}\n\n",
    );
    for chunk in batch {
        prompt.push_str(&format!("Chunk {}: {}\n\n", chunk.chunk_index, chunk.content));
    }
    prompt
}

fn single_prompt(chunk: &ChunkInput, context: &str) -> String {
    format!(
        "Summarize this chunk using the surrounding context for disambiguation.\nContext:\n{context}\n\nChunk: {}\n\nRespond as JSON: {{\"summary\":..,\"keywords\":[..],\"topics\":[..]}}",
        chunk.content
    )
}

fn document_prompt(title: &str, body: &str) -> String {
    format!(
        "Document title: {title}\n\nContent:\n{body}\n\nRespond as JSON: {{\"synopsis\":..,\"document_type\":\"narrative|transactional|technical|conversational\",\"capability_manifest\":{{}},\"synthesized_queries\":[..]}}"
    )
}

fn parse_batch_response(raw: &str, expected_len: usize) -> Vec<ChunkProfile> {
    let parsed: Vec<ChunkProfile> = serde_json::from_str(raw).unwrap_or_default();
    let mut out = parsed;
    out.resize(expected_len, ChunkProfile::default());
    out
}

fn parse_single_response(raw: &str) -> ChunkProfile {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_document_response(raw: &str) -> Result<DocumentProfile> {
    #[derive(serde::Deserialize)]
    struct Wire {
        synopsis: String,
        document_type: String,
        #[serde(default)]
        capability_manifest: serde_json::Value,
        #[serde(default)]
        synthesized_queries: Vec<String>,
    }
    let wire: Wire = serde_json::from_str(raw)
        .map_err(|e| ProfilingError::MalformedResponse(e.to_string()))?;
    let document_type = match wire.document_type.as_str() {
        "narrative" => DocumentType::Narrative,
        "transactional" => DocumentType::Transactional,
        "technical" => DocumentType::Technical,
        "conversational" => DocumentType::Conversational,
        other => return Err(ProfilingError::InvalidDocumentType(other.to_string())),
    };
    Ok(DocumentProfile {
        synopsis: wire.synopsis,
        document_type,
        capability_manifest: wire.capability_manifest,
        synthesized_queries: wire.synthesized_queries,
    })
}

fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(4);
    if text.len() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClientDyn for FakeLlm {
        async fn complete(&self, _prompt: &str, _model: &str, _timeout: Duration) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn service(response: &str) -> ProfilingService {
        ProfilingService::new(
            std::sync::Arc::new(FakeLlm { response: response.to_string() }),
            ProfilingConfig {
                model: "test-model".to_string(),
                timeout: Duration::from_secs(5),
                chunk_profiling_batch_size: 10,
                profiling_max_input_tokens: 8000,
                profiling_full_doc_max_tokens: 4000,
            },
        )
    }

    #[test]
    fn empty_summary_is_a_failed_chunk() {
        let p = ChunkProfile { summary: "   ".to_string(), keywords: vec![], topics: vec![] };
        assert!(p.is_failed());
    }

    #[tokio::test]
    async fn batch_profiling_produces_one_result_per_chunk() {
        let chunks = vec![
            ChunkInput { chunk_index: 0, content: "a".to_string() },
            ChunkInput { chunk_index: 1, content: "b".to_string() },
        ];
        let response = r#"[{"summary":"s1","keywords":[],"topics":[]},{"summary":"s2","keywords":[],"topics":[]}]"#;
        let (results, coverage) = service(response).profile_chunks(&chunks).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(coverage, 100.0);
    }

    #[tokio::test]
    async fn malformed_batch_response_retries_individually_and_still_counts_coverage() {
        let chunks = vec![ChunkInput { chunk_index: 0, content: "a".to_string() }];
        // batch parse fails -> defaults to empty summary -> retried individually,
        // and the retry also fails to parse -> stays failed, coverage 0.
        let (results, coverage) = service("not json").profile_chunks(&chunks).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(coverage, 0.0);
    }

    #[tokio::test]
    async fn invalid_document_type_is_rejected() {
        let document_response =
            r#"{"synopsis":"s","document_type":"bogus","capability_manifest":{},"synthesized_queries":[]}"#;
        let err = parse_document_response(document_response).unwrap_err();
        assert!(matches!(err, ProfilingError::InvalidDocumentType(_)));
        let _ = service(document_response); // keep helper used
    }
}
