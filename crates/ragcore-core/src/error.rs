//! Shared error taxonomy (spec §7).
//!
//! Every crate in the workspace defines its own `thiserror` enum for its own
//! failure modes, but they all converge on [`ErrorKind`] and [`ErrorEnvelope`]
//! so that stage handlers, the scheduler, and the plugin host can reason
//! about "is this retryable" without matching on a dozen concrete error
//! types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The taxonomy from spec §7. Each kind carries its own propagation policy,
/// recorded in the doc comment rather than in code, because the policy is
/// applied by the *caller* (stage handler, scheduler, plugin host), not by
/// this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad field, bad operator, magic-byte mismatch, unsupported file type,
    /// empty/too-large file. Never retried.
    InvalidInput,
    /// Document, KB, execution, experience, or user does not exist. Never retried.
    NotFound,
    /// RBAC check failed in the plugin host. Always a structured error, never an exception.
    AccessDenied,
    /// Idempotency skip (content hash matched). Not a failure at all.
    HashSkip,
    /// Staged file bytes were not found at retrieve time. Permanent failure of the owning handler.
    StagingMissing,
    /// Caller exceeded a rate limit. Transient; re-queued with backoff.
    RateLimited,
    /// LLM/OCR/embedder call timed out. Transient unless this was the final attempt.
    UpstreamTimeout,
    /// LLM/OCR/embedder call failed for a reason other than timeout. Transient unless final attempt.
    UpstreamFailure,
    /// Operation was cancelled. Permanent if it was the final attempt, retryable otherwise.
    Cancelled,
    /// A stated invariant was violated (embedding dimension mismatch, invalid `document_type` from an LLM). Fatal, logged loudly.
    InvariantViolation,
    /// Cache or queue backend is unreachable. Policy depends on the caller (rate limiter fails open; staging is fatal; scheduler retries next tick).
    ConnectionFailure,
}

impl ErrorKind {
    /// Whether a handler encountering this kind should ever retry, independent of attempts remaining.
    pub fn is_ever_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::UpstreamTimeout
                | ErrorKind::UpstreamFailure
                | ErrorKind::Cancelled
                | ErrorKind::ConnectionFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::HashSkip => "hash_skip",
            ErrorKind::StagingMissing => "staging_missing",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamFailure => "upstream_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::ConnectionFailure => "connection_failure",
        };
        write!(f, "{s}")
    }
}

/// Structured `{code, message, details}` error shape (spec §7) for anything
/// that crosses a service boundary (plugin host responses, search errors,
/// per-file upload results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
    /// Correlation ID for internal errors; present only when `code` represents
    /// a server-side fault worth tracing back to logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_id: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Map::new(),
            error_id: None,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        self.error_id = Some(id.into());
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Envelope(#[from] ErrorEnvelope),
}
