//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Id Extraction Error ==
/// Raised when an entity id cannot be produced from a cached result.
///
/// Carries enough context (the producing function, the offending item and
/// the rule that was applied) for the log line to point at the fix.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (source: {source_label}, item: {item}, rule: {rule})")]
pub struct IdExtractionError {
    /// Label of the function whose result was inspected
    pub source_label: String,
    /// Compact rendering of the item being inspected
    pub item: String,
    /// Rendering of the rule that failed
    pub rule: String,
    /// What went wrong
    pub message: String,
}

impl IdExtractionError {
    pub fn new(
        source_label: impl Into<String>,
        item: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            item: item.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

// == Cache Error Enum ==
/// Unified error type for the caching engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key-value store could not be reached or rejected the command
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A result could not be encoded for storage
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded into the expected type
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Entity ids could not be extracted from a result
    #[error("Id extraction failed: {0}")]
    IdExtraction(#[from] IdExtractionError),

    /// Invalid engine or decoration settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed admin request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::BackendUnavailable(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) | CacheError::Deserialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CacheError::IdExtraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Configuration(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
