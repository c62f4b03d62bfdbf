//! Signaling gateway handlers.
//!
//! Each handler validates its required fields up front and reports every
//! missing field in one `400`. Bodies that fail to parse as JSON are also
//! `400`s rather than axum's default `422`.

use crate::errors::SignalingError;
use crate::rooms::Envelope;
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use common::protocol::{
    JoinRequest, JoinResponse, LeaveRequest, PingRequest, PingResponse, PollQuery, PollResponse,
    RelayRequest, RelayResponse, RoomInfoResponse, RoomQuery, StatsResponse, SuccessResponse,
};
use common::types::{MessageType, UserType};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Parse the poll cursor; absent means "from the beginning".
fn parse_since(since: Option<&str>) -> Result<i64, SignalingError> {
    match since.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw.parse().map_err(|_| {
            SignalingError::InvalidParameter(format!("since must be an integer, got {raw:?}"))
        }),
    }
}

/// Handler for POST /api/join
#[instrument(skip_all, name = "signaling.gateway.join")]
pub async fn join(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<JoinResponse>, SignalingError> {
    let Json(request) = payload?;
    SignalingError::check_fields(request.missing_fields())?;

    let room_id = request.room_id.unwrap_or_default();
    let user_id = request.user_id.unwrap_or_default();
    let user_type = UserType::from(request.user_type.unwrap_or_default());

    let room_state = state.registry.join(&room_id, &user_id, user_type).await?;

    Ok(Json(JoinResponse {
        success: true,
        room_state,
    }))
}

/// Handler for POST /api/leave
#[instrument(skip_all, name = "signaling.gateway.leave")]
pub async fn leave(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LeaveRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, SignalingError> {
    let Json(request) = payload?;
    SignalingError::check_fields(request.missing_fields())?;

    let room_id = request.room_id.unwrap_or_default();
    let user_id = request.user_id.unwrap_or_default();

    state.registry.leave(&room_id, &user_id).await?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Absent `to` broadcasts; a present but blank `to` is rejected rather than
/// widened into a broadcast.
fn parse_recipient(to: Option<String>) -> Result<Option<String>, SignalingError> {
    match to {
        Some(to) if to.trim().is_empty() => Err(SignalingError::InvalidParameter(
            "to must name a recipient; omit it to broadcast".to_string(),
        )),
        other => Ok(other),
    }
}

/// Handler for POST /api/message
#[instrument(skip_all, name = "signaling.gateway.relay")]
pub async fn relay_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RelayRequest>, JsonRejection>,
) -> Result<Json<RelayResponse>, SignalingError> {
    let Json(request) = payload?;
    SignalingError::check_fields(request.missing_fields())?;
    let to = parse_recipient(request.to)?;

    let room_id = request.room_id.unwrap_or_default();
    let envelope = Envelope {
        message_type: MessageType::from(request.message_type.unwrap_or_default()),
        from: request.from.unwrap_or_default(),
        to,
        data: request.data.unwrap_or(Value::Null),
    };

    let message = state.registry.relay(&room_id, envelope).await?;

    debug!(
        target: "signaling.gateway",
        room_id = %room_id,
        message_id = %message.id,
        message_type = %message.message_type,
        from = %message.from,
        to = ?message.to,
        "Message relayed"
    );

    Ok(Json(RelayResponse {
        success: true,
        message_id: message.id,
    }))
}

/// Handler for GET /api/poll
///
/// Never blocks: returns whatever is deliverable right now, possibly nothing.
#[instrument(skip_all, name = "signaling.gateway.poll")]
pub async fn poll(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PollQuery>, QueryRejection>,
) -> Result<Json<PollResponse>, SignalingError> {
    let Query(query) = query?;
    SignalingError::check_fields(query.missing_fields())?;
    let since = parse_since(query.since.as_deref())?;

    let room_id = query.room_id.unwrap_or_default();
    let user_id = query.user_id.unwrap_or_default();

    let messages = state.registry.poll(&room_id, &user_id, since).await?;

    Ok(Json(PollResponse {
        messages,
        timestamp: now_ms(),
    }))
}

/// Handler for GET /api/room
#[instrument(skip_all, name = "signaling.gateway.room_info")]
pub async fn room_info(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RoomQuery>, QueryRejection>,
) -> Result<Json<RoomInfoResponse>, SignalingError> {
    let Query(query) = query?;
    let room_id = query
        .room_id
        .filter(|r| !r.trim().is_empty())
        .ok_or(SignalingError::MissingFields(vec!["roomId"]))?;

    let response = match state.registry.room_info(&room_id).await? {
        Some(snapshot) => RoomInfoResponse {
            room_id,
            users: snapshot.participants,
            exists: true,
            message_count: Some(snapshot.message_count),
        },
        None => RoomInfoResponse {
            room_id,
            users: Vec::new(),
            exists: false,
            message_count: None,
        },
    };

    Ok(Json(response))
}

/// Handler for POST /api/ping
#[instrument(skip_all, name = "signaling.gateway.ping")]
pub async fn ping(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PingRequest>, JsonRejection>,
) -> Result<Json<PingResponse>, SignalingError> {
    let Json(request) = payload?;
    SignalingError::check_fields(request.missing_fields())?;

    let user_id = request.user_id.unwrap_or_default();
    state.registry.heartbeat(&user_id).await?;

    Ok(Json(PingResponse {
        success: true,
        timestamp: now_ms(),
    }))
}

/// Handler for GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let (rooms, sessions) = state.registry.stats().await;
    Json(StatsResponse { rooms, sessions })
}

/// Handler for GET /ws
///
/// The streaming transport was retired; clients are pointed at polling.
pub async fn websocket_gone() -> SignalingError {
    info!(target: "signaling.gateway", "Rejected request to retired /ws endpoint");
    SignalingError::Gone(
        "WebSocket signaling is no longer supported; use POST /api/join, POST /api/message \
         and GET /api/poll"
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since(None).ok(), Some(0));
        assert_eq!(parse_since(Some("")).ok(), Some(0));
        assert_eq!(parse_since(Some("1700000000123")).ok(), Some(1_700_000_000_123));
        assert!(matches!(
            parse_since(Some("yesterday")),
            Err(SignalingError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_recipient() {
        assert_eq!(parse_recipient(None).ok(), Some(None));
        assert_eq!(
            parse_recipient(Some("bob".to_string())).ok(),
            Some(Some("bob".to_string()))
        );
        assert!(matches!(
            parse_recipient(Some(String::new())),
            Err(SignalingError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_recipient(Some("  ".to_string())),
            Err(SignalingError::InvalidParameter(_))
        ));
    }
}
