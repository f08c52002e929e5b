use axum::Json;

use crate::models::common::HealthResponse;

/// GET /health
///
/// Always ok; no dependency checks.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
