//! `RoomActor` - per-room actor that owns participant sessions and the
//! message backlog.
//!
//! Each `RoomActor`:
//! - Is the single writer for its sessions and backlog
//! - Stamps every appended message with a strictly increasing timestamp
//! - Caps the backlog, dropping the oldest entries first
//! - Emits `user-joined` / `user-left` notices on membership changes
//!
//! Liveness is tracked per session with `tokio::time::Instant` so eviction
//! follows the runtime clock (and paused time in tests).

use crate::errors::SignalingError;
use crate::observability::metrics;

use super::messages::{Envelope, JoinOutcome, RoomMessage, RoomSnapshot};

use common::protocol::{ParticipantInfo, RelayMessage};
use common::types::{MessageType, UserType};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Send a request and wait for the actor's reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> Result<T, SignalingError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| SignalingError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SignalingError::Internal(format!("response receive failed: {e}")))
    }

    /// Add a participant, or refresh one that is already present.
    pub async fn join(
        &self,
        user_id: String,
        user_type: UserType,
    ) -> Result<JoinOutcome, SignalingError> {
        self.request(|respond_to| RoomMessage::Join {
            user_id,
            user_type,
            respond_to,
        })
        .await
    }

    /// Remove a participant. Returns `false` if they were not a member.
    pub async fn leave(&self, user_id: String) -> Result<bool, SignalingError> {
        self.request(|respond_to| RoomMessage::Leave {
            user_id,
            respond_to,
        })
        .await
    }

    /// Append a message and return it as stored.
    pub async fn relay(&self, envelope: Envelope) -> Result<RelayMessage, SignalingError> {
        self.request(|respond_to| RoomMessage::Relay {
            envelope,
            respond_to,
        })
        .await
    }

    /// Messages after `since` that `user_id` may receive, at most `limit`.
    pub async fn poll(
        &self,
        user_id: String,
        since: i64,
        limit: usize,
    ) -> Result<Vec<RelayMessage>, SignalingError> {
        self.request(|respond_to| RoomMessage::Poll {
            user_id,
            since,
            limit,
            respond_to,
        })
        .await
    }

    /// Refresh liveness. Returns `false` if `user_id` is not a member.
    pub async fn touch(&self, user_id: String) -> Result<bool, SignalingError> {
        self.request(|respond_to| RoomMessage::Touch {
            user_id,
            respond_to,
        })
        .await
    }

    pub async fn info(&self) -> Result<RoomSnapshot, SignalingError> {
        self.request(|respond_to| RoomMessage::Info {
            evict_idle: None,
            respond_to,
        })
        .await
    }

    /// Snapshot after evicting participants idle for `timeout` or longer.
    pub async fn live_info(&self, timeout: Duration) -> Result<RoomSnapshot, SignalingError> {
        self.request(|respond_to| RoomMessage::Info {
            evict_idle: Some(timeout),
            respond_to,
        })
        .await
    }

    /// Evict participants idle for `timeout` or longer.
    pub async fn evict(&self, timeout: Duration) -> Result<Vec<String>, SignalingError> {
        self.request(|respond_to| RoomMessage::Evict {
            timeout,
            respond_to,
        })
        .await
    }

    /// Stop the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A participant's membership in this room.
#[derive(Debug, Clone)]
struct ParticipantSession {
    user_id: String,
    user_type: UserType,
    /// Position in join order; kept across re-joins.
    join_seq: u64,
    joined_at: Instant,
    last_seen: Instant,
}

impl ParticipantSession {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            user_id: self.user_id.clone(),
            user_type: self.user_type.clone(),
        }
    }
}

/// The room actor implementation.
pub struct RoomActor {
    room_id: String,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    sessions: HashMap<String, ParticipantSession>,
    backlog: VecDeque<RelayMessage>,
    max_backlog: usize,
    next_join_seq: u64,
    /// Timestamp of the most recently appended message.
    last_timestamp: i64,
    last_activity: Instant,
    messages_processed: u64,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        max_backlog: usize,
        cancel_token: CancellationToken,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            sessions: HashMap::new(),
            backlog: VecDeque::new(),
            max_backlog: max_backlog.max(1),
            next_join_seq: 0,
            last_timestamp: 0,
            last_activity: Instant::now(),
            messages_processed: 0,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "signaling.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        debug!(target: "signaling.room", room_id = %self.room_id, "RoomActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "signaling.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.messages_processed += 1;
                        }
                        None => {
                            debug!(
                                target: "signaling.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        // Sessions still held at shutdown no longer count as active.
        for _ in self.sessions.drain() {
            metrics::session_closed();
        }

        debug!(
            target: "signaling.room",
            room_id = %self.room_id,
            messages_processed = self.messages_processed,
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                user_id,
                user_type,
                respond_to,
            } => {
                let outcome = self.handle_join(user_id, user_type);
                let _ = respond_to.send(outcome);
            }
            RoomMessage::Leave {
                user_id,
                respond_to,
            } => {
                let removed = self.handle_leave(&user_id, json!({ "reason": "left" }));
                let _ = respond_to.send(removed);
            }
            RoomMessage::Relay {
                envelope,
                respond_to,
            } => {
                let message = self.append(envelope);
                let _ = respond_to.send(message);
            }
            RoomMessage::Poll {
                user_id,
                since,
                limit,
                respond_to,
            } => {
                let messages = self.handle_poll(&user_id, since, limit);
                let _ = respond_to.send(messages);
            }
            RoomMessage::Touch {
                user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.touch(&user_id));
            }
            RoomMessage::Info {
                evict_idle,
                respond_to,
            } => {
                let evicted = evict_idle
                    .map(|timeout| self.handle_evict(timeout))
                    .unwrap_or_default();
                let _ = respond_to.send(self.snapshot(evicted));
            }
            RoomMessage::Evict {
                timeout,
                respond_to,
            } => {
                let evicted = self.handle_evict(timeout);
                let _ = respond_to.send(evicted);
            }
        }
    }

    fn handle_join(&mut self, user_id: String, user_type: UserType) -> JoinOutcome {
        let now = Instant::now();

        let rejoined = if let Some(session) = self.sessions.get_mut(&user_id) {
            session.user_type = user_type.clone();
            session.last_seen = now;
            true
        } else {
            let join_seq = self.next_join_seq;
            self.next_join_seq += 1;
            self.sessions.insert(
                user_id.clone(),
                ParticipantSession {
                    user_id: user_id.clone(),
                    user_type: user_type.clone(),
                    join_seq,
                    joined_at: now,
                    last_seen: now,
                },
            );
            metrics::session_opened();
            false
        };

        info!(
            target: "signaling.room",
            room_id = %self.room_id,
            user_id = %user_id,
            user_type = %user_type,
            rejoined,
            participants = self.sessions.len(),
            "Participant joined"
        );

        self.append(Envelope {
            message_type: MessageType::UserJoined,
            from: user_id.clone(),
            to: None,
            data: json!({ "userType": user_type }),
        });

        let others = self
            .participants()
            .into_iter()
            .filter(|p| p.user_id != user_id)
            .collect();

        JoinOutcome { others, rejoined }
    }

    /// Remove a session and announce it. No-op for non-members.
    fn handle_leave(&mut self, user_id: &str, data: Value) -> bool {
        let Some(session) = self.sessions.remove(user_id) else {
            debug!(
                target: "signaling.room",
                room_id = %self.room_id,
                user_id = %user_id,
                "Leave for non-member ignored"
            );
            return false;
        };
        metrics::session_closed();

        info!(
            target: "signaling.room",
            room_id = %self.room_id,
            user_id = %user_id,
            member_for_ms = u64::try_from(session.joined_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            participants = self.sessions.len(),
            "Participant left"
        );

        self.append(Envelope {
            message_type: MessageType::UserLeft,
            from: user_id.to_string(),
            to: None,
            data,
        });
        true
    }

    fn handle_poll(&mut self, user_id: &str, since: i64, limit: usize) -> Vec<RelayMessage> {
        // Polling is proof of life for members.
        self.touch(user_id);

        self.backlog
            .iter()
            .filter(|m| m.timestamp > since && m.is_deliverable_to(user_id))
            .take(limit)
            .cloned()
            .collect()
    }

    fn touch(&mut self, user_id: &str) -> bool {
        match self.sessions.get_mut(user_id) {
            Some(session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    fn handle_evict(&mut self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();

        let mut stale: Vec<&ParticipantSession> = self
            .sessions
            .values()
            .filter(|s| now.duration_since(s.last_seen) >= timeout)
            .collect();
        stale.sort_by_key(|s| s.join_seq);
        let stale: Vec<String> = stale.into_iter().map(|s| s.user_id.clone()).collect();

        for user_id in &stale {
            info!(
                target: "signaling.room",
                room_id = %self.room_id,
                user_id = %user_id,
                timeout_secs = timeout.as_secs(),
                "Evicting idle participant"
            );
            self.handle_leave(user_id, json!({ "reason": "timeout" }));
        }

        stale
    }

    /// Stamp and append a message, enforcing the backlog cap.
    fn append(&mut self, envelope: Envelope) -> RelayMessage {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let timestamp = now_ms.max(self.last_timestamp.saturating_add(1));
        self.last_timestamp = timestamp;

        let message = RelayMessage {
            id: Uuid::new_v4().to_string(),
            room_id: self.room_id.clone(),
            message_type: envelope.message_type,
            from: envelope.from,
            to: envelope.to,
            data: envelope.data,
            timestamp,
        };

        self.backlog.push_back(message.clone());

        let mut dropped = 0u64;
        while self.backlog.len() > self.max_backlog {
            self.backlog.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!(
                target: "signaling.room",
                room_id = %self.room_id,
                dropped,
                "Backlog full, dropped oldest messages"
            );
            metrics::record_backlog_dropped(dropped);
        }

        metrics::record_message_relayed(&message.message_type);
        self.last_activity = Instant::now();
        message
    }

    fn participants(&self) -> Vec<ParticipantInfo> {
        let mut sessions: Vec<&ParticipantSession> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.join_seq);
        sessions.into_iter().map(ParticipantSession::info).collect()
    }

    fn snapshot(&self, evicted: Vec<String>) -> RoomSnapshot {
        RoomSnapshot {
            participants: self.participants(),
            message_count: self.backlog.len(),
            evicted,
            last_activity: self.last_activity,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn spawn_room(max_backlog: usize) -> RoomActorHandle {
        let (handle, _task) = RoomActor::spawn("R1".to_string(), max_backlog, CancellationToken::new());
        handle
    }

    fn offer(from: &str, to: Option<&str>) -> Envelope {
        Envelope {
            message_type: MessageType::Offer,
            from: from.to_string(),
            to: to.map(str::to_string),
            data: json!({ "sdp": "v=0" }),
        }
    }

    #[tokio::test]
    async fn test_join_snapshot_excludes_joiner() {
        let room = spawn_room(100);

        let first = room.join("alice".to_string(), UserType::Caller).await.unwrap();
        assert!(first.others.is_empty());
        assert!(!first.rejoined);

        let second = room.join("bob".to_string(), UserType::Callee).await.unwrap();
        assert_eq!(
            second.others,
            vec![ParticipantInfo {
                user_id: "alice".to_string(),
                user_type: UserType::Caller,
            }]
        );
    }

    #[tokio::test]
    async fn test_rejoin_updates_role_without_duplicating() {
        let room = spawn_room(100);
        room.join("alice".to_string(), UserType::Caller).await.unwrap();

        let again = room.join("alice".to_string(), UserType::Callee).await.unwrap();
        assert!(again.rejoined);

        let info = room.info().await.unwrap();
        assert_eq!(info.participants.len(), 1);
        assert_eq!(info.participants[0].user_type, UserType::Callee);
    }

    #[tokio::test]
    async fn test_join_announces_to_existing_members() {
        let room = spawn_room(100);
        room.join("alice".to_string(), UserType::Caller).await.unwrap();
        room.join("bob".to_string(), UserType::Callee).await.unwrap();

        let seen_by_alice = room.poll("alice".to_string(), 0, 20).await.unwrap();
        assert_eq!(seen_by_alice.len(), 1);
        assert_eq!(seen_by_alice[0].message_type, MessageType::UserJoined);
        assert_eq!(seen_by_alice[0].from, "bob");
        assert_eq!(seen_by_alice[0].data["userType"], "callee");
    }

    #[tokio::test]
    async fn test_poll_filters_sender_and_recipient() {
        let room = spawn_room(100);
        for user in ["alice", "bob", "carol"] {
            room.join(user.to_string(), UserType::from("guest")).await.unwrap();
        }
        let cursor = room.relay(offer("alice", None)).await.unwrap().timestamp - 1;
        room.relay(offer("alice", Some("bob"))).await.unwrap();

        let alice = room.poll("alice".to_string(), cursor, 20).await.unwrap();
        assert!(alice.is_empty());

        let bob = room.poll("bob".to_string(), cursor, 20).await.unwrap();
        assert_eq!(bob.len(), 2);

        let carol = room.poll("carol".to_string(), cursor, 20).await.unwrap();
        assert_eq!(carol.len(), 1);
        assert!(carol[0].to.is_none());
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let room = spawn_room(500);
        let mut last = 0;
        for _ in 0..200 {
            let message = room.relay(offer("alice", None)).await.unwrap();
            assert!(message.timestamp > last);
            last = message.timestamp;
        }
    }

    #[tokio::test]
    async fn test_backlog_is_capped_oldest_first() {
        let room = spawn_room(100);
        let mut sent = Vec::new();
        for i in 0..150 {
            let message = room
                .relay(Envelope {
                    message_type: MessageType::Offer,
                    from: "alice".to_string(),
                    to: None,
                    data: json!({ "seq": i }),
                })
                .await
                .unwrap();
            sent.push(message);
        }

        let info = room.info().await.unwrap();
        assert_eq!(info.message_count, 100);

        let page = room.poll("bob".to_string(), 0, 20).await.unwrap();
        assert_eq!(page.len(), 20);
        assert_eq!(page[0].data["seq"], 50);
        assert_eq!(page[0].id, sent[50].id);
    }

    #[tokio::test]
    async fn test_poll_pages_from_cursor() {
        let room = spawn_room(100);
        for _ in 0..25 {
            room.relay(offer("alice", None)).await.unwrap();
        }

        let first = room.poll("bob".to_string(), 0, 20).await.unwrap();
        assert_eq!(first.len(), 20);
        let cursor = first.last().unwrap().timestamp;

        let second = room.poll("bob".to_string(), cursor, 20).await.unwrap();
        assert_eq!(second.len(), 5);
        assert!(second.iter().all(|m| m.timestamp > cursor));
    }

    #[tokio::test]
    async fn test_leave_non_member_is_noop() {
        let room = spawn_room(100);
        assert!(!room.leave("ghost".to_string()).await.unwrap());
        assert_eq!(room.info().await.unwrap().message_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_idle_participant_with_timeout_notice() {
        let room = spawn_room(100);
        room.join("alice".to_string(), UserType::Caller).await.unwrap();
        room.join("bob".to_string(), UserType::Callee).await.unwrap();

        for _ in 0..7 {
            tokio::time::advance(Duration::from_secs(5)).await;
            room.touch("alice".to_string()).await.unwrap();
        }

        let evicted = room.evict(Duration::from_secs(30)).await.unwrap();
        assert_eq!(evicted, vec!["bob".to_string()]);

        let info = room.info().await.unwrap();
        assert_eq!(info.participants.len(), 1);
        assert_eq!(info.participants[0].user_id, "alice");

        let notices = room.poll("alice".to_string(), 0, 20).await.unwrap();
        let left = notices.last().unwrap();
        assert_eq!(left.message_type, MessageType::UserLeft);
        assert_eq!(left.from, "bob");
        assert_eq!(left.data, json!({ "reason": "timeout" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_counts_as_liveness() {
        let room = spawn_room(100);
        room.join("bob".to_string(), UserType::Callee).await.unwrap();

        tokio::time::advance(Duration::from_secs(25)).await;
        room.poll("bob".to_string(), 0, 20).await.unwrap();
        tokio::time::advance(Duration::from_secs(25)).await;

        assert!(room.evict(Duration::from_secs(30)).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_for_exactly_the_timeout_is_evicted() {
        let room = spawn_room(100);
        room.join("bob".to_string(), UserType::Callee).await.unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(room.evict(Duration::from_secs(30)).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(
            room.evict(Duration::from_secs(30)).await.unwrap(),
            vec!["bob".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_info_evicts_before_snapshot() {
        let room = spawn_room(100);
        room.join("alice".to_string(), UserType::Caller).await.unwrap();
        room.join("bob".to_string(), UserType::Callee).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        room.touch("alice".to_string()).await.unwrap();

        // A plain snapshot leaves sessions alone.
        assert_eq!(room.info().await.unwrap().participants.len(), 2);

        let info = room.live_info(Duration::from_secs(30)).await.unwrap();
        assert_eq!(info.evicted, vec!["bob".to_string()]);
        assert_eq!(info.participants.len(), 1);
        assert_eq!(info.participants[0].user_id, "alice");
    }

    #[tokio::test]
    async fn test_cancelled_room_rejects_requests() {
        let (room, task) = RoomActor::spawn("R1".to_string(), 100, CancellationToken::new());
        room.cancel();
        task.await.unwrap();

        assert!(room.is_cancelled());
        assert!(matches!(
            room.info().await,
            Err(SignalingError::Internal(_))
        ));
    }
}
