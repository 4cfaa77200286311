//! Error handling for the API server

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cairn::{ContentHash, HashParseError, TreeError};
use cairn_registry::{ReferenceError, RegistryError};
use serde_json::json;
use thiserror::Error;

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid reference: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Invalid hash: {0}")]
    InvalidHash(#[from] HashParseError),

    #[error("Malformed package tree: {0}")]
    Tree(#[from] TreeError),

    #[error("Hash mismatch: expected {expected}, contents hash to {computed}")]
    HashMismatch {
        expected: ContentHash,
        computed: ContentHash,
    },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Registry(e) if e.is_not_found() => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Registry(RegistryError::VersionConflict { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Registry(
                RegistryError::MalformedInput(_) | RegistryError::InvalidReference(_),
            ) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Registry(e) => {
                tracing::error!("Registry failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Reference(_)
            | ApiError::InvalidHash(_)
            | ApiError::Tree(_)
            | ApiError::HashMismatch { .. }
            | ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
            ),
            ApiError::Io(_) | ApiError::Internal(_) => {
                tracing::error!("Internal failure: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

// Convenience functions for common errors
impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        Self::BadRequest(msg.to_string())
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Forbidden(msg.to_string())
    }
}
