//! Deterministic stand-ins for the collaborator traits this workspace
//! treats as out of scope (spec §1: "per-format text extraction internals,
//! embedding model internals, LLM invocation internals... stay out of
//! scope"). These let the worker run end to end without a real OCR engine,
//! embedding model, or LLM provider wired in; a production deployment
//! swaps them for real adapters behind the same trait seams.

use async_trait::async_trait;
use ragcore_core::hash::sha256_hex;
use ragcore_ingestion::stages::{EmbedderDyn, ExtractionOutcome, TextExtractorDyn};
use ragcore_profiling::LlmClientDyn;
use std::time::Duration;

/// Treats every file as UTF-8 text, replacing invalid sequences rather than
/// failing (no OCR/PDF/Office-document parsing).
pub struct PassthroughTextExtractor;

#[async_trait]
impl TextExtractorDyn for PassthroughTextExtractor {
    async fn extract(
        &self,
        _filename: &str,
        bytes: &[u8],
        _use_ocr: bool,
        _ocr_mode: &str,
    ) -> ragcore_ingestion::Result<ExtractionOutcome> {
        Ok(ExtractionOutcome {
            text: String::from_utf8_lossy(bytes).into_owned(),
            metadata: ragcore_core::models::ExtractionMetadata {
                method: Some("passthrough".to_string()),
                ..Default::default()
            },
        })
    }
}

/// Embeds a chunk as a fixed-dimension vector derived from its content
/// hash — deterministic and collision-resistant enough for development and
/// testing, not a real semantic embedding.
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbedderDyn for DeterministicEmbedder {
    async fn embed(&self, texts: &[String]) -> ragcore_ingestion::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| vector_from_hash(text, self.dimension)).collect())
    }

    fn model_name(&self) -> &str {
        "deterministic-dev-embedder"
    }
}

fn vector_from_hash(text: &str, dimension: usize) -> Vec<f32> {
    let digest = sha256_hex(text.as_bytes());
    let bytes = digest.as_bytes();
    (0..dimension)
        .map(|i| {
            let b = bytes[i % bytes.len()];
            (b as f32 / 255.0) * 2.0 - 1.0
        })
        .collect()
}

/// Returns a minimal, always-valid profiling response instead of calling a
/// real model — enough for `ProfilingService` to exercise its parsing and
/// persistence paths without a provider configured.
pub struct EchoLlmClient;

#[async_trait]
impl LlmClientDyn for EchoLlmClient {
    async fn complete(&self, prompt: &str, _model: &str, _timeout: Duration) -> ragcore_profiling::Result<String> {
        let truncated: String = prompt.chars().take(80).collect();
        Ok(serde_json::json!({
            "summary": truncated,
            "keywords": [],
            "topics": [],
        })
        .to_string())
    }
}
