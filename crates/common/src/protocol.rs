//! HTTP request and response bodies for the signaling gateway.
//!
//! Field names are camelCase on the wire. Request bodies keep every field
//! optional so the gateway can report *all* missing fields at once instead of
//! failing on the first deserialization error.

use crate::types::{MessageType, UserType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message stored in a room backlog and delivered by poll.
///
/// Immutable once appended. `timestamp` is strictly increasing within a room
/// and doubles as the poll cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub id: String,
    pub room_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub from: String,
    /// Recipient; `None` means broadcast to the room minus the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: i64,
}

impl RelayMessage {
    /// Whether `identity` may receive this message.
    ///
    /// Senders never receive their own messages; unicast messages only reach
    /// their recipient.
    #[must_use]
    pub fn is_deliverable_to(&self, identity: &str) -> bool {
        if self.from == identity {
            return false;
        }
        match &self.to {
            Some(recipient) => recipient == identity,
            None => true,
        }
    }
}

/// A participant as seen by the other members of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: String,
    pub user_type: UserType,
}

/// Treats absent, empty and whitespace-only values as missing.
fn is_missing(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

fn collect_missing(fields: &[(&'static str, Option<&String>)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, value)| is_missing(*value))
        .map(|(name, _)| *name)
        .collect()
}

/// `POST /api/join`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
}

impl JoinRequest {
    #[must_use]
    pub fn new(room_id: &str, user_id: &str, user_type: &UserType) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            user_id: Some(user_id.to_string()),
            user_type: Some(user_type.to_string()),
        }
    }

    /// Wire names of required fields that are absent or blank.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("roomId", self.room_id.as_ref()),
            ("userId", self.user_id.as_ref()),
            ("userType", self.user_type.as_ref()),
        ])
    }
}

/// `POST /api/leave`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl LeaveRequest {
    #[must_use]
    pub fn new(room_id: &str, user_id: &str) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            user_id: Some(user_id.to_string()),
        }
    }

    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("roomId", self.room_id.as_ref()),
            ("userId", self.user_id.as_ref()),
        ])
    }
}

/// `POST /api/message`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RelayRequest {
    #[must_use]
    pub fn new(room_id: &str, from: &str, message_type: &MessageType) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            from: Some(from.to_string()),
            to: None,
            message_type: Some(message_type.to_string()),
            data: None,
        }
    }

    /// Address the message to a single recipient.
    #[must_use]
    pub fn to(mut self, recipient: &str) -> Self {
        self.to = Some(recipient.to_string());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("roomId", self.room_id.as_ref()),
            ("from", self.from.as_ref()),
            ("type", self.message_type.as_ref()),
        ])
    }
}

/// `GET /api/poll` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Cursor; kept as a string so a malformed value is reported, not
    /// rejected by the extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

impl PollQuery {
    #[must_use]
    pub fn new(room_id: &str, user_id: &str, since: i64) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            user_id: Some(user_id.to_string()),
            since: Some(since.to_string()),
        }
    }

    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        collect_missing(&[
            ("roomId", self.room_id.as_ref()),
            ("userId", self.user_id.as_ref()),
        ])
    }
}

/// `GET /api/room` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

/// `POST /api/ping`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl PingRequest {
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        collect_missing(&[("userId", self.user_id.as_ref())])
    }
}

/// Participant snapshot returned by join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub users: Vec<ParticipantInfo>,
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub success: bool,
    pub room_state: RoomState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub messages: Vec<RelayMessage>,
    /// Server time in milliseconds when the poll was answered.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoResponse {
    pub room_id: String,
    pub users: Vec<ParticipantInfo>,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub success: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 server time.
    pub time: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub rooms: usize,
    pub sessions: usize,
}

/// Error body used by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(from: &str, to: Option<&str>) -> RelayMessage {
        RelayMessage {
            id: "m-1".to_string(),
            room_id: "R1".to_string(),
            message_type: MessageType::Offer,
            from: from.to_string(),
            to: to.map(str::to_string),
            data: Value::Null,
            timestamp: 1,
        }
    }

    #[test]
    fn test_sender_never_receives_own_message() {
        assert!(!message("alice", None).is_deliverable_to("alice"));
        assert!(!message("alice", Some("alice")).is_deliverable_to("alice"));
    }

    #[test]
    fn test_unicast_reaches_only_recipient() {
        let msg = message("alice", Some("bob"));
        assert!(msg.is_deliverable_to("bob"));
        assert!(!msg.is_deliverable_to("carol"));
    }

    #[test]
    fn test_broadcast_reaches_everyone_but_sender() {
        let msg = message("alice", None);
        assert!(msg.is_deliverable_to("bob"));
        assert!(msg.is_deliverable_to("carol"));
    }

    #[test]
    fn test_join_request_reports_all_missing_fields() {
        let request: JoinRequest = serde_json::from_value(json!({ "roomId": "R1", "userId": "" })).unwrap();
        assert_eq!(request.missing_fields(), vec!["userId", "userType"]);
    }

    #[test]
    fn test_relay_request_uses_type_field() {
        let request = RelayRequest::new("R1", "alice", &MessageType::Offer)
            .to("bob")
            .with_data(json!({ "sdp": "v=0" }));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "offer");
        assert_eq!(value["to"], "bob");
        assert!(request.missing_fields().is_empty());
    }

    #[test]
    fn test_relay_message_omits_absent_recipient() {
        let value = serde_json::to_value(message("alice", None)).unwrap();
        assert!(value.get("to").is_none());
        assert_eq!(value["roomId"], "R1");
        assert_eq!(value["type"], "offer");
    }
}
