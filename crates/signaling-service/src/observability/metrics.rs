//! Metrics definitions for the signaling service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signaling_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `message_type`: 6 values (custom types collapse to "custom")
//! - `operation`: one per gateway route
//! - `status`: 3 values (success, error, timeout)

use common::types::MessageType;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to serve
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("signaling_http".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gateway Metrics
// ============================================================================

/// Record a completed HTTP request.
///
/// Metric: `signaling_http_requests_total`, `signaling_http_request_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_http_request(path: &str, status_code: u16, duration: Duration) {
    let operation = operation_for_path(path);
    let status = categorize_status_code(status_code);

    histogram!("signaling_http_request_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("signaling_http_requests_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path to a bounded operation label.
fn operation_for_path(path: &str) -> &'static str {
    match path {
        "/api/join" => "join",
        "/api/leave" => "leave",
        "/api/message" => "relay",
        "/api/poll" => "poll",
        "/api/room" => "room_info",
        "/api/ping" => "ping",
        "/api/stats" => "stats",
        "/health" => "health",
        "/ready" => "ready",
        "/metrics" => "metrics",
        "/ws" => "ws",
        _ => "other",
    }
}

// ============================================================================
// Room Metrics
// ============================================================================

/// Set the number of live rooms.
///
/// Metric: `signaling_rooms_active`
#[allow(clippy::cast_precision_loss)]
pub fn set_rooms_active(count: usize) {
    gauge!("signaling_rooms_active").set(count as f64);
}

/// A new participant session was created.
///
/// Metric: `signaling_sessions_active`
pub fn session_opened() {
    gauge!("signaling_sessions_active").increment(1.0);
}

/// A participant session ended (leave, move or eviction).
///
/// Metric: `signaling_sessions_active`
pub fn session_closed() {
    gauge!("signaling_sessions_active").decrement(1.0);
}

/// Record a message appended to a room backlog.
///
/// Metric: `signaling_messages_relayed_total`
/// Labels: `message_type`
pub fn record_message_relayed(message_type: &MessageType) {
    counter!("signaling_messages_relayed_total",
        "message_type" => message_type.metric_label()
    )
    .increment(1);
}

/// Record sessions removed by the liveness sweep.
///
/// Metric: `signaling_sessions_evicted_total`
pub fn record_sessions_evicted(count: u64) {
    counter!("signaling_sessions_evicted_total").increment(count);
}

/// Record backlog entries dropped to respect the cap.
///
/// Metric: `signaling_backlog_dropped_total`
pub fn record_backlog_dropped(count: u64) {
    counter!("signaling_backlog_dropped_total").increment(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(400), "error");
        assert_eq!(categorize_status_code(410), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_operation_for_path_is_bounded() {
        assert_eq!(operation_for_path("/api/message"), "relay");
        assert_eq!(operation_for_path("/api/room"), "room_info");
        assert_eq!(operation_for_path("/api/unknown/123"), "other");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // Without an installed recorder these calls must not panic.
        record_http_request("/api/join", 200, Duration::from_millis(3));
        set_rooms_active(2);
        session_opened();
        session_closed();
        record_message_relayed(&MessageType::Offer);
        record_message_relayed(&MessageType::custom("call-status"));
        record_sessions_evicted(1);
        record_backlog_dropped(5);
    }
}
