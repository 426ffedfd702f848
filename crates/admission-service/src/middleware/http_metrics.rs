//! HTTP metrics middleware.
//!
//! Records every response, including framework-level rejections that never
//! reach a handler (404, 405, 415, JSON parse errors).

use crate::observability::metrics::record_http_request;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Endpoint label for requests that matched no route.
const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Record method, route template, status, and latency of each request.
///
/// The endpoint label is the matched route template (for example
/// `/api/v1/meetings/:meeting_id/agent`), so meeting ids never become
/// label values.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
