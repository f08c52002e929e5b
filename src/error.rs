use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::{credentials::CredentialError, usage_store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        ApiError::Transport(format!("Credential refresh failed: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Messages are surfaced as-is; callers rely on the upstream detail text
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", msg)
            }
            ApiError::Transport(msg) => {
                tracing::error!("Transport error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "TRANSPORT_ERROR", msg)
            }
            ApiError::Store(StoreError::InvalidDocumentId(id)) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("Invalid user_id: {:?}", id),
            ),
            ApiError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string())
            }
        };

        let body = json!({
            "detail": message,
            "code": error_code,
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
