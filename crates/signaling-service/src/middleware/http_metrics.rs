//! HTTP metrics middleware.
//!
//! Records every response, including framework-level rejections that never
//! reach a handler (405, unmatched routes, timeouts).

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Middleware that records request count and latency per gateway operation.
///
/// Applied as the outermost layer.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&path, response.status().as_u16(), start.elapsed());

    response
}
