//! Structured error codes (spec §4.11: "so plugin code can branch on codes
//! rather than catch exceptions").

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorCode {
    InvalidField,
    InvalidOperator,
    InvalidValue,
    NotFound,
}

#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{code:?}: {message}")]
pub struct SearchError {
    pub code: SearchErrorCode,
    pub message: String,
}

impl SearchError {
    pub fn invalid_field(field: &str) -> Self {
        Self { code: SearchErrorCode::InvalidField, message: format!("unknown searchable field: {field}") }
    }

    pub fn invalid_operator(operator: &str, field: &str) -> Self {
        Self {
            code: SearchErrorCode::InvalidOperator,
            message: format!("operator '{operator}' is not valid for field '{field}'"),
        }
    }

    pub fn invalid_value(reason: &str) -> Self {
        Self { code: SearchErrorCode::InvalidValue, message: reason.to_string() }
    }

    pub fn not_found(what: &str) -> Self {
        Self { code: SearchErrorCode::NotFound, message: format!("{what} not found") }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
