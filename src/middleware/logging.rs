use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use tower_http::request_id::RequestId;

/// Logs method, uri, status and latency for every request.
///
/// Bodies are not buffered: extract payloads are multi-megabyte images.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let body_len = content_length(&request);
    let start = Instant::now();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body_len = body_len,
        "→ Request"
    );

    let response = next.run(request).await;

    let status = response.status();
    let latency = start.elapsed();

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            "← Response"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            "← Response"
        );
    }

    response
}

fn content_length(request: &Request) -> u64 {
    request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
