//! Health, readiness and metrics handlers.

use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::protocol::HealthResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /health
///
/// Liveness probe. Returns `{status, time, service}` while the process is
/// live, 503 otherwise.
///
/// ```json
/// { "status": "ok", "time": "2024-05-01T12:00:00Z", "service": "signaling-service" }
/// ```
#[instrument(skip_all, name = "signaling.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status_code, status) = if state.health.is_live() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            service: state.config.service_name.clone(),
        }),
    )
}

/// Handler for GET /ready
///
/// Returns 200 once the service accepts traffic, 503 during startup and
/// shutdown.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.health.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping.
#[instrument(skip_all, name = "signaling.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
