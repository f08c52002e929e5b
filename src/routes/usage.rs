use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::usage::{UsageMutationRequest, UsageMutationResponse, UsageQuery, UsageView},
    routes::parse_json_body,
};

/// GET /usage?user_id=...
#[instrument(skip(state, query))]
pub async fn get_usage(
    State(state): State<AppState>,
    query: std::result::Result<Query<UsageQuery>, QueryRejection>,
) -> Result<Json<UsageView>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let user_id = validated_user_id(&query, query.user_id.as_deref())?;

    let view = state.quota_service.read(user_id).await?;

    Ok(Json(view))
}

/// POST /usage/increment
#[instrument(skip(state, body))]
pub async fn increment_usage(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UsageMutationResponse>> {
    let request: UsageMutationRequest = parse_json_body(&body)?;
    let user_id = validated_user_id(&request, request.user_id.as_deref())?;

    let view = state.quota_service.increment(user_id).await?;

    Ok(Json(view.into()))
}

/// POST /usage/grant_reward
#[instrument(skip(state, body))]
pub async fn grant_reward(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UsageMutationResponse>> {
    let request: UsageMutationRequest = parse_json_body(&body)?;
    let user_id = validated_user_id(&request, request.user_id.as_deref())?;

    let view = state.quota_service.grant_reward(user_id).await?;

    Ok(Json(view.into()))
}

/// Presence check on the DTO; blank-after-trim is rejected by the ledger
fn validated_user_id<'a>(request: &impl Validate, user_id: Option<&'a str>) -> Result<&'a str> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    user_id.ok_or_else(|| ApiError::BadRequest("user_id required".to_string()))
}
