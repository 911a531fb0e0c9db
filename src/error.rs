//! Error types for the lazy cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the lazy cache.
///
/// Cloneable so that every caller waiting on the same computation observes
/// the same failure.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Empty or whitespace key, or otherwise unusable input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The value factory returned an error, panicked or was aborted
    #[error("Value factory failed: {0:#}")]
    FactoryFailure(Arc<anyhow::Error>),

    /// Key not present (only surfaced by the HTTP layer)
    #[error("Key not found: {0}")]
    NotFound(String),
}

impl CacheError {
    /// Wraps a factory error so it can be shared between waiters.
    pub fn factory(error: anyhow::Error) -> Self {
        CacheError::FactoryFailure(Arc::new(error))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::FactoryFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the lazy cache.
pub type Result<T> = std::result::Result<T, CacheError>;
