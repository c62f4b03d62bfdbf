//! Background poll loop.
//!
//! Pulls new messages for one participant on a fixed interval, advances the
//! cursor, and keeps the participant alive with a heartbeat. Repeated poll
//! failures are reported as a signaling disconnect so the reconnection
//! controller can react.

use super::SignalingChannel;
use crate::config::PollerConfig;
use common::protocol::RelayMessage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel capacity for poll events.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Upper bound on back-to-back polls within one tick when pages are full.
const MAX_PAGES_PER_TICK: usize = 5;

/// Output of the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Message(RelayMessage),
    /// Polling has failed `failure_threshold` times in a row.
    Disconnected,
    /// Polling succeeded again after a disconnect.
    Reconnected,
}

/// Poll loop for one participant in one room.
pub struct Poller {
    channel: Arc<dyn SignalingChannel>,
    room_id: String,
    user_id: String,
    since: i64,
    config: PollerConfig,
    consecutive_failures: u32,
    disconnected: bool,
    events: mpsc::Sender<PollEvent>,
    cancel_token: CancellationToken,
}

impl Poller {
    /// Spawn the poll loop.
    ///
    /// Polling starts from cursor `since`. The loop ends when `cancel_token`
    /// fires or the returned receiver is dropped.
    pub fn spawn(
        channel: Arc<dyn SignalingChannel>,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        since: i64,
        config: PollerConfig,
        cancel_token: CancellationToken,
    ) -> (JoinHandle<()>, mpsc::Receiver<PollEvent>) {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let poller = Self {
            channel,
            room_id: room_id.into(),
            user_id: user_id.into(),
            since,
            config,
            consecutive_failures: 0,
            disconnected: false,
            events,
            cancel_token,
        };
        (tokio::spawn(poller.run()), receiver)
    }

    #[instrument(skip_all, name = "call.poller", fields(room_id = %self.room_id, user_id = %self.user_id))]
    async fn run(mut self) {
        info!(target: "call.poller", "Poller started");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.poller", "Poller cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.tick().await {
                        debug!(target: "call.poller", "Event receiver dropped");
                        break;
                    }
                }
            }
        }

        info!(target: "call.poller", since = self.since, "Poller stopped");
    }

    /// One poll cycle. Returns false once nobody is listening.
    async fn tick(&mut self) -> bool {
        for _ in 0..MAX_PAGES_PER_TICK {
            match self
                .channel
                .poll(&self.room_id, &self.user_id, self.since)
                .await
            {
                Ok(page) => {
                    if !self.record_success().await {
                        return false;
                    }
                    if page.messages.is_empty() {
                        break;
                    }
                    for message in page.messages {
                        self.since = self.since.max(message.timestamp);
                        if self.events.send(PollEvent::Message(message)).await.is_err() {
                            return false;
                        }
                    }
                }
                Err(e) => {
                    return self.record_failure(&e).await;
                }
            }
        }

        if self.config.heartbeat {
            if let Err(e) = self.channel.ping(&self.user_id).await {
                debug!(target: "call.poller", error = %e, "Heartbeat failed");
            }
        }

        !self.events.is_closed()
    }

    async fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        if self.disconnected {
            self.disconnected = false;
            info!(target: "call.poller", "Signaling reachable again");
            return self.events.send(PollEvent::Reconnected).await.is_ok();
        }
        true
    }

    async fn record_failure(&mut self, error: &crate::errors::ClientError) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        debug!(
            target: "call.poller",
            error = %error,
            failures = self.consecutive_failures,
            "Poll failed"
        );

        if !self.disconnected && self.consecutive_failures >= self.config.failure_threshold {
            self.disconnected = true;
            warn!(
                target: "call.poller",
                failures = self.consecutive_failures,
                "Signaling unreachable"
            );
            return self.events.send(PollEvent::Disconnected).await.is_ok();
        }
        !self.events.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::signaling::mock::MockSignalingChannel;
    use common::types::MessageType;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(100),
            failure_threshold: 3,
            heartbeat: true,
        }
    }

    async fn next_event(receiver: &mut mpsc::Receiver<PollEvent>) -> PollEvent {
        tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("timed out waiting for poll event")
            .expect("poller stopped")
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_messages_once() {
        let channel = Arc::new(MockSignalingChannel::new());
        channel
            .push_message("bob", MessageType::Answer, json!({ "sdp": "v=0" }))
            .await;

        let cancel = CancellationToken::new();
        let (handle, mut events) =
            Poller::spawn(channel.clone(), "R1", "alice", 0, config(), cancel.clone());

        match next_event(&mut events).await {
            PollEvent::Message(message) => {
                assert_eq!(message.message_type, MessageType::Answer);
                assert_eq!(message.from, "bob");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Later ticks must not redeliver the same message.
        channel
            .push_message("bob", MessageType::IceCandidate, json!({}))
            .await;
        match next_event(&mut events).await {
            PollEvent::Message(message) => {
                assert_eq!(message.message_type, MessageType::IceCandidate);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(channel.ping_count() >= 1);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_disconnect_after_threshold_then_recovery() {
        let channel = Arc::new(MockSignalingChannel::new());
        channel.set_fail_poll(true);

        let cancel = CancellationToken::new();
        let (handle, mut events) =
            Poller::spawn(channel.clone(), "R1", "alice", 0, config(), cancel.clone());

        assert_eq!(next_event(&mut events).await, PollEvent::Disconnected);
        assert_eq!(channel.poll_count(), 3);

        channel.set_fail_poll(false);
        assert_eq!(next_event(&mut events).await, PollEvent::Reconnected);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_receiver_dropped() {
        let channel = Arc::new(MockSignalingChannel::new());
        let (handle, events) = Poller::spawn(
            channel,
            "R1",
            "alice",
            0,
            config(),
            CancellationToken::new(),
        );
        drop(events);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller should stop")
            .unwrap();
    }
}
