//! Common data types for signaling components.
//!
//! Message types and participant roles travel as plain strings on the wire.
//! Known values map to dedicated variants; anything else is preserved verbatim
//! so that clients can exchange application-defined messages without a
//! server change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire tag for a join notice.
pub const USER_JOINED: &str = "user-joined";

/// Wire tag for a leave notice.
pub const USER_LEFT: &str = "user-left";

/// Kind of a relayed signaling message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// A participant joined the room (emitted by the registry).
    UserJoined,
    /// A participant left or was evicted (emitted by the registry).
    UserLeft,
    /// Session description offer.
    Offer,
    /// Session description answer.
    Answer,
    /// Network candidate.
    IceCandidate,
    /// Any application-defined message type.
    Custom(String),
}

impl MessageType {
    /// Build a custom message type.
    #[must_use]
    pub fn custom(tag: impl Into<String>) -> Self {
        Self::from(tag.into())
    }

    /// Returns the wire tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::UserJoined => USER_JOINED,
            MessageType::UserLeft => USER_LEFT,
            MessageType::Offer => "offer",
            MessageType::Answer => "answer",
            MessageType::IceCandidate => "ice-candidate",
            MessageType::Custom(tag) => tag,
        }
    }

    /// Bounded label for metrics (custom tags collapse to "custom").
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            MessageType::UserJoined => "user_joined",
            MessageType::UserLeft => "user_left",
            MessageType::Offer => "offer",
            MessageType::Answer => "answer",
            MessageType::IceCandidate => "ice_candidate",
            MessageType::Custom(_) => "custom",
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            USER_JOINED => MessageType::UserJoined,
            USER_LEFT => MessageType::UserLeft,
            "offer" => MessageType::Offer,
            "answer" => MessageType::Answer,
            "ice-candidate" => MessageType::IceCandidate,
            _ => MessageType::Custom(tag),
        }
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a participant within a call room (`userType` on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserType {
    /// The party that placed the call.
    Caller,
    /// The party being called.
    Callee,
    /// Any other role string supplied by the client.
    Other(String),
}

impl UserType {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            UserType::Caller => "caller",
            UserType::Callee => "callee",
            UserType::Other(role) => role,
        }
    }
}

impl From<String> for UserType {
    fn from(role: String) -> Self {
        match role.as_str() {
            "caller" => UserType::Caller,
            "callee" => UserType::Callee,
            _ => UserType::Other(role),
        }
    }
}

impl From<&str> for UserType {
    fn from(role: &str) -> Self {
        Self::from(role.to_string())
    }
}

impl From<UserType> for String {
    fn from(user_type: UserType) -> Self {
        match user_type {
            UserType::Other(role) => role,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_message_types_parse() {
        assert_eq!(MessageType::from("offer"), MessageType::Offer);
        assert_eq!(MessageType::from("answer"), MessageType::Answer);
        assert_eq!(MessageType::from("ice-candidate"), MessageType::IceCandidate);
        assert_eq!(MessageType::from("user-joined"), MessageType::UserJoined);
        assert_eq!(MessageType::from("user-left"), MessageType::UserLeft);
    }

    #[test]
    fn test_unknown_message_type_is_preserved() {
        let message_type: MessageType = serde_json::from_str("\"call-status\"").unwrap();
        assert_eq!(message_type, MessageType::Custom("call-status".to_string()));
        assert_eq!(
            serde_json::to_string(&message_type).unwrap(),
            "\"call-status\""
        );
        assert_eq!(message_type.metric_label(), "custom");
    }

    #[test]
    fn test_user_type_wire_values() {
        assert_eq!(
            serde_json::to_string(&UserType::Caller).unwrap(),
            "\"caller\""
        );
        let other: UserType = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(other, UserType::Other("doctor".to_string()));
        assert_eq!(other.to_string(), "doctor");
    }
}
