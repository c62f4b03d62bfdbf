//! Call status updates exchanged between caller and callee.
//!
//! Status updates ride the relay as messages of type [`CALL_STATUS_TYPE`]
//! whose `data` is a serialized [`CallStatusUpdate`].

use crate::error::{ProtocolError, Result};
use crate::protocol::RelayMessage;
use crate::types::MessageType;
use serde::{Deserialize, Serialize};

/// Relay message type carrying a [`CallStatusUpdate`].
pub const CALL_STATUS_TYPE: &str = "call-status";

/// Status reported by one side of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Accepted,
    Declined,
    Canceled,
}

/// Why a call was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Nobody answered before the ring deadline.
    Timeout,
    /// The caller hung up while ringing.
    CallerCanceled,
    /// Any reason this version does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusUpdate {
    pub call_id: String,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<CancelReason>,
}

impl CallStatusUpdate {
    #[must_use]
    pub fn new(call_id: impl Into<String>, status: CallStatus) -> Self {
        Self {
            call_id: call_id.into(),
            status,
            reason: None,
        }
    }

    #[must_use]
    pub fn canceled(call_id: impl Into<String>, reason: CancelReason) -> Self {
        Self {
            call_id: call_id.into(),
            status: CallStatus::Canceled,
            reason: Some(reason),
        }
    }

    /// The relay message type for status updates.
    #[must_use]
    pub fn message_type() -> MessageType {
        MessageType::custom(CALL_STATUS_TYPE)
    }

    /// Decode a status update from a relayed message.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedType` if the message is not a call status update,
    /// or `MalformedPayload` if its data cannot be decoded.
    pub fn from_message(message: &RelayMessage) -> Result<Self> {
        if message.message_type.as_str() != CALL_STATUS_TYPE {
            return Err(ProtocolError::UnexpectedType(
                message.message_type.to_string(),
            ));
        }
        serde_json::from_value(message.data.clone())
            .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }

    /// Serialize as relay `data`.
    #[must_use]
    pub fn to_data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay(message_type: &str, data: serde_json::Value) -> RelayMessage {
        RelayMessage {
            id: "m-1".to_string(),
            room_id: "R1".to_string(),
            message_type: MessageType::from(message_type),
            from: "bob".to_string(),
            to: Some("alice".to_string()),
            data,
            timestamp: 10,
        }
    }

    #[test]
    fn test_canceled_update_wire_shape() {
        let update = CallStatusUpdate::canceled("call-1", CancelReason::CallerCanceled);
        assert_eq!(
            update.to_data(),
            json!({ "callId": "call-1", "status": "canceled", "reason": "caller_canceled" })
        );
    }

    #[test]
    fn test_decode_from_relay_message() {
        let message = relay(CALL_STATUS_TYPE, json!({ "callId": "call-1", "status": "accepted" }));
        let update = CallStatusUpdate::from_message(&message).unwrap();
        assert_eq!(update, CallStatusUpdate::new("call-1", CallStatus::Accepted));
    }

    #[test]
    fn test_unknown_reason_is_tolerated() {
        let message = relay(
            CALL_STATUS_TYPE,
            json!({ "callId": "call-1", "status": "canceled", "reason": "busy" }),
        );
        let update = CallStatusUpdate::from_message(&message).unwrap();
        assert_eq!(update.reason, Some(CancelReason::Unknown));
    }

    #[test]
    fn test_rejects_other_message_types() {
        let message = relay("offer", json!({}));
        assert!(matches!(
            CallStatusUpdate::from_message(&message),
            Err(ProtocolError::UnexpectedType(t)) if t == "offer"
        ));
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let message = relay(CALL_STATUS_TYPE, json!({ "status": "ringing" }));
        assert!(matches!(
            CallStatusUpdate::from_message(&message),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }
}
