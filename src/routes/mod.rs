// Route modules
pub mod extract;
pub mod health;
pub mod usage;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::{api_key_middleware, logging_middleware},
};
use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    // Routes gated by the shared-secret header (no-op when no key is configured)
    let protected_routes = Router::new()
        .route("/usage", get(usage::get_usage))
        .route("/usage/increment", post(usage::increment_usage))
        .route("/usage/grant_reward", post(usage::grant_reward))
        .route("/extract", post(extract::extract))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ));

    let public_routes = Router::new().route("/health", get(health::health));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(state)
}

/// Parse a JSON request body regardless of its `Content-Type` header
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}
