//! Client side of the signaling gateway.
//!
//! [`SignalingChannel`] is the seam between the controllers and the wire.
//! [`HttpSignalingClient`] talks to a real gateway; [`mock::MockSignalingChannel`]
//! records traffic for unit tests.

mod http;
mod poller;

pub use http::HttpSignalingClient;
pub use poller::{PollEvent, Poller};

use crate::errors::ClientError;
use common::protocol::{PollResponse, RelayRequest, RoomState};
use common::types::UserType;

/// Operations a participant performs against the signaling gateway.
#[async_trait::async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Join `room_id` and return the other participants.
    async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        user_type: &UserType,
    ) -> Result<RoomState, ClientError>;

    async fn leave(&self, room_id: &str, user_id: &str) -> Result<(), ClientError>;

    /// Relay a message and return its assigned id.
    async fn relay(&self, request: RelayRequest) -> Result<String, ClientError>;

    /// Fetch messages newer than `since` addressed to `user_id`.
    async fn poll(
        &self,
        room_id: &str,
        user_id: &str,
        since: i64,
    ) -> Result<PollResponse, ClientError>;

    /// Refresh liveness of `user_id`.
    async fn ping(&self, user_id: &str) -> Result<(), ClientError>;
}

/// Mock signaling channel for unit testing.
pub mod mock {
    use super::*;
    use common::protocol::{ParticipantInfo, RelayMessage};
    use common::types::MessageType;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// In-memory signaling channel.
    ///
    /// Relayed requests are recorded for inspection. Messages queued with
    /// [`push_message`](Self::push_message) are returned by `poll` once their
    /// timestamp is newer than the cursor.
    #[derive(Default)]
    pub struct MockSignalingChannel {
        relayed: Mutex<Vec<RelayRequest>>,
        inbox: Mutex<VecDeque<RelayMessage>>,
        clock: AtomicI64,
        poll_count: AtomicUsize,
        ping_count: AtomicUsize,
        fail_relay: AtomicBool,
        fail_poll: AtomicBool,
    }

    impl MockSignalingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an inbound message; returns its timestamp.
        pub async fn push_message(
            &self,
            from: &str,
            message_type: MessageType,
            data: serde_json::Value,
        ) -> i64 {
            let timestamp = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
            self.inbox.lock().await.push_back(RelayMessage {
                id: format!("mock-{timestamp}"),
                room_id: "mock-room".to_string(),
                message_type,
                from: from.to_string(),
                to: None,
                data,
                timestamp,
            });
            timestamp
        }

        /// Requests passed to `relay`, in order.
        pub async fn relayed(&self) -> Vec<RelayRequest> {
            self.relayed.lock().await.clone()
        }

        /// Make subsequent `relay` calls fail with a transport error.
        pub fn set_fail_relay(&self, fail: bool) {
            self.fail_relay.store(fail, Ordering::SeqCst);
        }

        /// Make subsequent `poll` calls fail with a transport error.
        pub fn set_fail_poll(&self, fail: bool) {
            self.fail_poll.store(fail, Ordering::SeqCst);
        }

        pub fn poll_count(&self) -> usize {
            self.poll_count.load(Ordering::SeqCst)
        }

        pub fn ping_count(&self) -> usize {
            self.ping_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SignalingChannel for MockSignalingChannel {
        async fn join(
            &self,
            room_id: &str,
            _user_id: &str,
            _user_type: &UserType,
        ) -> Result<RoomState, ClientError> {
            Ok(RoomState {
                users: Vec::<ParticipantInfo>::new(),
                room_id: room_id.to_string(),
            })
        }

        async fn leave(&self, _room_id: &str, _user_id: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn relay(&self, request: RelayRequest) -> Result<String, ClientError> {
            if self.fail_relay.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("mock relay failure".to_string()));
            }
            let mut relayed = self.relayed.lock().await;
            relayed.push(request);
            Ok(format!("relayed-{}", relayed.len()))
        }

        async fn poll(
            &self,
            _room_id: &str,
            _user_id: &str,
            since: i64,
        ) -> Result<PollResponse, ClientError> {
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_poll.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("mock poll failure".to_string()));
            }
            let inbox = self.inbox.lock().await;
            let messages = inbox
                .iter()
                .filter(|m| m.timestamp > since)
                .cloned()
                .collect();
            Ok(PollResponse {
                messages,
                timestamp: self.clock.load(Ordering::SeqCst),
            })
        }

        async fn ping(&self, _user_id: &str) -> Result<(), ClientError> {
            self.ping_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
