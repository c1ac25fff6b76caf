//! Capability-facing errors. Spec §4.10: a denied or invalid capability
//! call "returns a structured `{status: 'error', error: {code, message}}`
//! rather than throwing" — the idiomatic Rust rendition of that contract is
//! a `Result<T, CapabilityError>` whose `Err` carries the same `{code,
//! message}` shape, instead of a host-side panic or exception.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct CapabilityError {
    pub code: String,
    pub message: String,
}

impl CapabilityError {
    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self { code: "not_permitted".to_string(), message: message.into() }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self { code: "rate_limited".to_string(), message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { code: "not_found".to_string(), message: message.into() }
    }

    pub fn from_ingestion(e: ragcore_ingestion::IngestionError) -> Self {
        Self { code: "ingestion_failed".to_string(), message: e.to_string() }
    }
}

impl From<ragcore_search::SearchError> for CapabilityError {
    fn from(e: ragcore_search::SearchError) -> Self {
        use ragcore_search::SearchErrorCode::*;
        let code = match e.code {
            InvalidField => "invalid_field",
            InvalidOperator => "invalid_operator",
            InvalidValue => "invalid_value",
            NotFound => "not_found",
        };
        Self { code: code.to_string(), message: e.message }
    }
}

impl From<ragcore_ingestion::IngestionError> for CapabilityError {
    fn from(e: ragcore_ingestion::IngestionError) -> Self {
        Self::from_ingestion(e)
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;

/// The job-execution side (spec §4.6/§4.9 conventions): errors that abort
/// `_handle_plugin_execution_job` itself rather than a single capability call.
#[derive(Debug, thiserror::Error)]
pub enum PluginHostError {
    #[error("plugin execution not found: {0}")]
    ExecutionNotFound(String),
    #[error("plugin execution {0} is not pending")]
    NotPending(String),
    #[error("no entrypoint registered for plugin {0}")]
    UnknownPlugin(String),
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },
    #[error("repository operation failed: {0}")]
    Repository(String),
    #[error(transparent)]
    Queue(#[from] ragcore_infra::QueueError),
}

pub type HostResult<T> = std::result::Result<T, PluginHostError>;
