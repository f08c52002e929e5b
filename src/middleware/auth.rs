//! Shared-secret API key middleware
//!
//! Compares the `x-api-key` header with the configured backend key. When no
//! key is configured every request passes.

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Returns 401 Unauthorized if the header is missing or does not match.
pub async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(expected) = state.config.auth.required_api_key() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if provided != Some(expected) {
            tracing::warn!(uri = %request.uri(), "Rejected request with invalid API key");
            return Err(ApiError::Unauthorized("Invalid API key".to_string()));
        }
    }

    Ok(next.run(request).await)
}
