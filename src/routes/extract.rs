use axum::{body::Bytes, extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::ai::{ExtractRequest, ExtractResponse},
    routes::parse_json_body,
};

/// POST /extract
///
/// Quota is not checked here; clients call /usage first.
#[instrument(skip(state, body))]
pub async fn extract(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ExtractResponse>> {
    let request: ExtractRequest = parse_json_body(&body)?;
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let image_base64 = request.image_base64.as_deref().unwrap_or_default();
    let output = state
        .ai_service
        .extract(image_base64, &request.prompt)
        .await?;

    Ok(Json(ExtractResponse { text: output.text }))
}
