//! Collaborator traits for the things spec §1 declares out of scope: text
//! extraction, embedding, and LLM invocation. The core depends on these as
//! black boxes; real deployments provide concrete adapters.
//!
//! Mirrors the seam the teacher puts its `copilot_core::traits::{Repository,
//! HealthCheck}` surface at: small async traits with an associated `Error`,
//! implemented by infra adapters and mocked in tests.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// OCR/text-extraction mode requested for a document (spec §4.7.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrMode {
    Auto,
    Always,
    Never,
    Fallback,
    TextOnly,
}

impl OcrMode {
    pub fn from_str_or_auto(s: Option<&str>) -> Self {
        match s {
            Some("always") => OcrMode::Always,
            Some("never") => OcrMode::Never,
            Some("fallback") => OcrMode::Fallback,
            Some("text_only") => OcrMode::TextOnly,
            _ => OcrMode::Auto,
        }
    }

    /// `use_ocr = ocr_mode != "text_only"` (spec §4.7.3 step 5).
    pub fn use_ocr(self) -> bool {
        !matches!(self, OcrMode::TextOnly)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub text: String,
    pub method: String,
    pub engine: Option<String>,
    pub confidence: Option<f64>,
    pub duration_ms: u64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// `TextExtractor.extract(bytes, filename, mode) -> {text, metadata}` (spec §1).
#[async_trait]
pub trait TextExtractor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn extract(
        &self,
        filename: &str,
        bytes: &[u8],
        ocr_mode: OcrMode,
    ) -> Result<ExtractionOutcome, Self::Error>;
}

/// `Embedder.embed(strings) -> vectors` (spec §1).
#[async_trait]
pub trait Embedder: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Self::Error>;

    /// The fixed dimension this embedder produces; must match the configured
    /// index dimension (spec §3 invariant, §8 property 10).
    fn dimension(&self) -> usize;
}

/// `LLMClient.complete(prompt, model, timeout) -> text` (spec §1).
#[async_trait]
pub trait LLMClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: std::time::Duration,
    ) -> Result<String, Self::Error>;
}

/// Minimal persistence boundary. Spec §1 puts "relational/vector database
/// schema beyond the invariants stated in §3" out of scope, so this crate
/// only states the operations a stage handler or scheduler tick needs, not a
/// concrete schema. `T` is the aggregate type; `Id` its key.
#[async_trait]
pub trait Repository<T, Id>: Send + Sync
where
    T: Send + Sync + Debug,
    Id: Send + Sync + Debug,
{
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(&self, id: &Id) -> Result<Option<T>, Self::Error>;
    async fn upsert(&self, entity: T) -> Result<T, Self::Error>;
    async fn delete(&self, id: &Id) -> Result<bool, Self::Error>;
}

/// Generic serde-friendly key/value repository, used by tests and by the
/// in-memory fakes that stand in for a real store. Not a wire contract.
#[async_trait]
pub trait KvStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, Self::Error>;
    async fn put<T: Serialize + Send + Sync>(&self, key: &str, value: &T)
        -> Result<(), Self::Error>;
    async fn remove(&self, key: &str) -> Result<bool, Self::Error>;
}
