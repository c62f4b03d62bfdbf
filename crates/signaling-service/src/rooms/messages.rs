//! Mailbox messages for room actors.
//!
//! Every request that expects an answer carries a `oneshot` sender; the room
//! actor replies once the mutation has been applied.

use common::protocol::{ParticipantInfo, RelayMessage};
use common::types::{MessageType, UserType};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add or refresh a participant.
    Join {
        user_id: String,
        user_type: UserType,
        respond_to: oneshot::Sender<JoinOutcome>,
    },

    /// Remove a participant. Replies `true` if the participant was present.
    Leave {
        user_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Append a message to the backlog.
    Relay {
        envelope: Envelope,
        respond_to: oneshot::Sender<RelayMessage>,
    },

    /// Read deliverable messages after a cursor.
    Poll {
        user_id: String,
        since: i64,
        limit: usize,
        respond_to: oneshot::Sender<Vec<RelayMessage>>,
    },

    /// Refresh a participant's liveness. Replies `true` if the participant
    /// was present.
    Touch {
        user_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Snapshot of the room. With `evict_idle` set, participants not seen
    /// within that window are evicted first so the snapshot never lists them.
    Info {
        evict_idle: Option<Duration>,
        respond_to: oneshot::Sender<RoomSnapshot>,
    },

    /// Remove participants not seen within `timeout`. Replies with the
    /// evicted identities.
    Evict {
        timeout: Duration,
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

/// A message submitted for relay, before the room stamps it.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message_type: MessageType,
    pub from: String,
    pub to: Option<String>,
    pub data: Value,
}

/// Result of a join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Participants already in the room, excluding the joiner.
    pub others: Vec<ParticipantInfo>,
    /// Whether the joiner was already a member.
    pub rejoined: bool,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub participants: Vec<ParticipantInfo>,
    pub message_count: usize,
    /// Participants evicted while the snapshot was taken.
    pub evicted: Vec<String>,
    /// Last time the room was mutated.
    pub last_activity: Instant,
}

impl RoomSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
