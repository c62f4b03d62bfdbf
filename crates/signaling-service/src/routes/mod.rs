//! HTTP routes for the signaling service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::observability::HealthState;
use crate::rooms::RoomRegistry;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::protocol::ErrorResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,

    /// Service configuration.
    pub config: Config,

    pub health: Arc<HealthState>,
}

/// Turn a handler panic into the standard 500 error body.
fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(target: "signaling.gateway", "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal server error".to_string(),
            details: "An internal error occurred".to_string(),
        }),
    )
        .into_response()
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/api/join`, `/api/leave`, `/api/message`, `/api/ping` (POST)
/// - `/api/poll`, `/api/room`, `/api/stats` (GET)
/// - `/ws` - retired streaming endpoint, always 410
/// - `/health`, `/ready` - liveness and readiness probes
/// - `/metrics` - Prometheus scrape endpoint
/// - Permissive CORS, request tracing, panic catching and a request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.request_timeout;

    let api_routes = Router::new()
        .route("/api/join", post(handlers::join))
        .route("/api/leave", post(handlers::leave))
        .route("/api/message", post(handlers::relay_message))
        .route("/api/poll", get(handlers::poll))
        .route("/api/room", get(handlers::room_info))
        .route("/api/ping", post(handlers::ping))
        .route("/api/stats", get(handlers::stats))
        .route("/ws", get(handlers::websocket_gone))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. CatchPanicLayer - convert handler panics to 500 (innermost)
    // 2. TimeoutLayer
    // 3. TraceLayer
    // 4. CorsLayer - every response carries CORS headers
    // 5. http_metrics_middleware - record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(http_metrics_middleware))
}
