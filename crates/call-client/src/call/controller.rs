//! `CallLifecycleController` - per-call actor for an outbound call.
//!
//! The actor owns the call state and its two timers:
//! - the ring deadline, armed on creation and only live while `Ringing`
//! - the accept grace delay, armed when the callee accepts
//!
//! Both timers are `select!` branches guarded by the current state, so a
//! transition out of `Ringing` disarms the deadline before it can fire.

use super::directory::{CallDirectory, CallSession};
use super::state::{transition, CallEvent, CallState};
use crate::config::CallConfig;
use crate::errors::ClientError;
use crate::signaling::SignalingChannel;

use common::call::{CallStatusUpdate, CancelReason, CALL_STATUS_TYPE};
use common::protocol::{RelayMessage, RelayRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the call mailbox.
const CALL_CHANNEL_BUFFER: usize = 64;

/// Channel buffer size for effects.
const EFFECT_CHANNEL_BUFFER: usize = 16;

/// Side effects for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEffect {
    /// The callee accepted and the grace delay has passed.
    ReadyToJoin { room_id: String },
    /// Ringing is over; emitted once per call.
    Ended { state: CallState },
}

/// Observable state of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSnapshot {
    pub call_id: String,
    /// `None` when the session could not be fetched.
    pub session: Option<CallSession>,
    pub state: CallState,
    /// Ring deadline while `Ringing`.
    pub deadline: Option<Instant>,
}

impl CallSnapshot {
    /// Time left before the call times out.
    #[must_use]
    pub fn remaining(&self) -> Option<std::time::Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

enum CallCommand {
    Deliver(RelayMessage),
    Cancel {
        respond_to: oneshot::Sender<CallState>,
    },
}

/// Handle to a running call.
#[derive(Clone, Debug)]
pub struct CallHandle {
    call_id: String,
    sender: mpsc::Sender<CallCommand>,
    snapshot: watch::Receiver<CallSnapshot>,
    cancel_token: CancellationToken,
}

impl CallHandle {
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    #[must_use]
    pub fn state(&self) -> CallState {
        self.snapshot.borrow().state
    }

    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch the call state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    /// Feed a relayed message to the call.
    ///
    /// Messages that are not status updates for this call are ignored.
    pub async fn deliver(&self, message: RelayMessage) -> Result<(), ClientError> {
        self.sender
            .send(CallCommand::Deliver(message))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    /// Hang up while ringing.
    ///
    /// Returns the state after the command; a call that already ended keeps
    /// its state.
    pub async fn cancel(&self) -> Result<CallState, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CallCommand::Cancel { respond_to: tx })
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// Wait until the call reaches a terminal state.
    pub async fn wait_for_terminal(&self) -> Result<CallState, ClientError> {
        let mut snapshot = self.snapshot.clone();
        let settled = snapshot
            .wait_for(|s| s.state.is_terminal())
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        Ok(settled.state)
    }

    /// Stop the actor and its timers.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// The per-call actor.
pub struct CallLifecycleController {
    call_id: String,
    session: Option<CallSession>,
    signaling: Arc<dyn SignalingChannel>,
    config: CallConfig,
    state: CallState,
    deadline: Instant,
    grace_until: Option<Instant>,
    receiver: mpsc::Receiver<CallCommand>,
    effects: mpsc::Sender<CallEffect>,
    snapshot: watch::Sender<CallSnapshot>,
    cancel_token: CancellationToken,
}

impl CallLifecycleController {
    /// Fetch the call session and start ringing.
    ///
    /// If the session cannot be fetched the call starts (and stays)
    /// `Canceled`, and `Ended` is emitted right away.
    pub async fn start(
        call_id: impl Into<String>,
        directory: &dyn CallDirectory,
        signaling: Arc<dyn SignalingChannel>,
        config: CallConfig,
        cancel_token: CancellationToken,
    ) -> (CallHandle, JoinHandle<()>, mpsc::Receiver<CallEffect>) {
        let call_id = call_id.into();

        let (session, state) = match directory.fetch(&call_id).await {
            Ok(session) => (Some(session), CallState::Ringing),
            Err(e) => {
                warn!(target: "call.lifecycle", call_id = %call_id, error = %e, "Call session fetch failed");
                (None, CallState::Canceled)
            }
        };

        let deadline = Instant::now() + config.ring_timeout;
        let (sender, receiver) = mpsc::channel(CALL_CHANNEL_BUFFER);
        let (effects, effects_rx) = mpsc::channel(EFFECT_CHANNEL_BUFFER);
        let (snapshot, snapshot_rx) = watch::channel(CallSnapshot {
            call_id: call_id.clone(),
            session: session.clone(),
            state,
            deadline: (state == CallState::Ringing).then_some(deadline),
        });

        let actor = Self {
            call_id: call_id.clone(),
            session,
            signaling,
            config,
            state,
            deadline,
            grace_until: None,
            receiver,
            effects,
            snapshot,
            cancel_token: cancel_token.clone(),
        };

        let task = tokio::spawn(actor.run());
        let handle = CallHandle {
            call_id,
            sender,
            snapshot: snapshot_rx,
            cancel_token,
        };
        (handle, task, effects_rx)
    }

    #[instrument(skip_all, name = "call.lifecycle", fields(call_id = %self.call_id))]
    async fn run(mut self) {
        if self.state.is_terminal() {
            self.emit(CallEffect::Ended { state: self.state });
        } else {
            info!(
                target: "call.lifecycle",
                ring_timeout_secs = self.config.ring_timeout.as_secs(),
                "Call ringing"
            );
        }

        loop {
            let ringing = self.state == CallState::Ringing;
            let deadline = self.deadline;
            let grace_until = self.grace_until;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.lifecycle", "Call controller cancelled");
                    break;
                }
                () = tokio::time::sleep_until(deadline), if ringing => {
                    self.on_deadline().await;
                }
                () = sleep_until_opt(grace_until), if grace_until.is_some() => {
                    self.on_grace_elapsed();
                }
                command = self.receiver.recv() => {
                    match command {
                        Some(CallCommand::Deliver(message)) => self.on_message(&message),
                        Some(CallCommand::Cancel { respond_to }) => {
                            self.on_local_cancel(respond_to).await;
                        }
                        None => {
                            debug!(target: "call.lifecycle", "All call handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "call.lifecycle", state = %self.state, "Call controller stopped");
    }

    /// Apply `event`; returns the new state if it changed.
    fn apply(&mut self, event: CallEvent) -> Option<CallState> {
        let next = transition(self.state, event)?;
        info!(
            target: "call.lifecycle",
            from = %self.state,
            to = %next,
            ?event,
            "Call state changed"
        );
        self.state = next;
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = next;
            snapshot.deadline = None;
        });
        Some(next)
    }

    async fn on_deadline(&mut self) {
        if self.apply(CallEvent::Timeout).is_none() {
            return;
        }
        self.send_cancel(CancelReason::Timeout).await;
        self.emit(CallEffect::Ended {
            state: CallState::Timeout,
        });
    }

    fn on_message(&mut self, message: &RelayMessage) {
        if message.message_type.as_str() != CALL_STATUS_TYPE {
            return;
        }
        let update = match CallStatusUpdate::from_message(message) {
            Ok(update) => update,
            Err(e) => {
                warn!(target: "call.lifecycle", error = %e, message_id = %message.id, "Ignoring malformed status update");
                return;
            }
        };
        if update.call_id != self.call_id {
            return;
        }

        let Some(next) = self.apply(CallEvent::Status(update.status)) else {
            debug!(
                target: "call.lifecycle",
                status = ?update.status,
                state = %self.state,
                "Ignoring status update in terminal state"
            );
            return;
        };

        if next == CallState::Accepted {
            self.grace_until = Some(Instant::now() + self.config.accept_grace);
        }
        self.emit(CallEffect::Ended { state: next });
    }

    fn on_grace_elapsed(&mut self) {
        self.grace_until = None;
        if let Some(session) = &self.session {
            info!(target: "call.lifecycle", room_id = %session.room_id, "Ready to join call room");
            let room_id = session.room_id.clone();
            self.emit(CallEffect::ReadyToJoin { room_id });
        }
    }

    async fn on_local_cancel(&mut self, respond_to: oneshot::Sender<CallState>) {
        let changed = self.apply(CallEvent::LocalCancel).is_some();
        let _ = respond_to.send(self.state);
        if changed {
            self.send_cancel(CancelReason::CallerCanceled).await;
            self.emit(CallEffect::Ended {
                state: CallState::Canceled,
            });
        }
    }

    /// Tell the callee the call is over.
    async fn send_cancel(&self, reason: CancelReason) {
        let Some(session) = &self.session else {
            return;
        };
        let update = CallStatusUpdate::canceled(self.call_id.clone(), reason);
        let request = RelayRequest::new(
            &session.room_id,
            &session.caller_id,
            &CallStatusUpdate::message_type(),
        )
        .to(&session.callee_id)
        .with_data(update.to_data());

        match self.signaling.relay(request).await {
            Ok(message_id) => {
                debug!(target: "call.lifecycle", reason = ?reason, message_id = %message_id, "Cancel update relayed");
            }
            Err(e) => {
                warn!(target: "call.lifecycle", reason = ?reason, error = %e, "Failed to relay cancel update");
            }
        }
    }

    fn emit(&self, effect: CallEffect) {
        if let Err(e) = self.effects.try_send(effect) {
            debug!(target: "call.lifecycle", error = %e, "Effect dropped");
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::call::directory::InMemoryCallDirectory;
    use crate::signaling::mock::MockSignalingChannel;
    use common::call::CallStatus;
    use common::types::MessageType;
    use std::time::Duration;

    struct Fixture {
        handle: CallHandle,
        task: JoinHandle<()>,
        effects: mpsc::Receiver<CallEffect>,
        signaling: Arc<MockSignalingChannel>,
    }

    async fn start_call() -> Fixture {
        let directory = InMemoryCallDirectory::new();
        directory
            .insert(CallSession::new("call-1", "R1", "alice", "bob"))
            .await;
        let signaling = Arc::new(MockSignalingChannel::new());
        let (handle, task, effects) = CallLifecycleController::start(
            "call-1",
            &directory,
            signaling.clone(),
            CallConfig::default(),
            CancellationToken::new(),
        )
        .await;
        Fixture {
            handle,
            task,
            effects,
            signaling,
        }
    }

    fn status_message(call_id: &str, status: CallStatus) -> RelayMessage {
        RelayMessage {
            id: format!("m-{call_id}"),
            room_id: "R1".to_string(),
            message_type: CallStatusUpdate::message_type(),
            from: "bob".to_string(),
            to: Some("alice".to_string()),
            data: CallStatusUpdate::new(call_id, status).to_data(),
            timestamp: 1,
        }
    }

    async fn next_effect(effects: &mut mpsc::Receiver<CallEffect>) -> CallEffect {
        tokio::time::timeout(Duration::from_secs(120), effects.recv())
            .await
            .expect("timed out waiting for effect")
            .expect("effect channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_ringing_with_deadline() {
        let fixture = start_call().await;
        let snapshot = fixture.handle.snapshot();
        assert_eq!(snapshot.state, CallState::Ringing);
        assert_eq!(snapshot.remaining(), Some(Duration::from_secs(45)));
        fixture.handle.shutdown();
        fixture.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_relays_exactly_one_cancel() {
        let mut fixture = start_call().await;
        let started = Instant::now();

        let effect = next_effect(&mut fixture.effects).await;
        assert_eq!(
            effect,
            CallEffect::Ended {
                state: CallState::Timeout
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(45));
        assert_eq!(fixture.handle.state(), CallState::Timeout);

        let relayed = fixture.signaling.relayed().await;
        assert_eq!(relayed.len(), 1);
        let request = &relayed[0];
        assert_eq!(request.from.as_deref(), Some("alice"));
        assert_eq!(request.to.as_deref(), Some("bob"));
        assert_eq!(request.message_type.as_deref(), Some(CALL_STATUS_TYPE));
        assert_eq!(
            request.data,
            Some(CallStatusUpdate::canceled("call-1", CancelReason::Timeout).to_data())
        );

        // A late acceptance does not revive the call.
        fixture
            .handle
            .deliver(status_message("call-1", CallStatus::Accepted))
            .await
            .unwrap();
        assert_eq!(fixture.handle.cancel().await.unwrap(), CallState::Timeout);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(fixture.handle.state(), CallState::Timeout);
        assert_eq!(fixture.signaling.relayed().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_emits_ready_after_grace() {
        let mut fixture = start_call().await;
        tokio::time::advance(Duration::from_secs(10)).await;

        fixture
            .handle
            .deliver(status_message("call-1", CallStatus::Accepted))
            .await
            .unwrap();
        assert_eq!(
            next_effect(&mut fixture.effects).await,
            CallEffect::Ended {
                state: CallState::Accepted
            }
        );

        let accepted_at = Instant::now();
        assert_eq!(
            next_effect(&mut fixture.effects).await,
            CallEffect::ReadyToJoin {
                room_id: "R1".to_string()
            }
        );
        assert_eq!(accepted_at.elapsed(), Duration::from_secs(1));

        // The ring deadline no longer fires.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(fixture.handle.state(), CallState::Accepted);
        assert!(fixture.signaling.relayed().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decline_and_remote_cancel() {
        for (status, expected) in [
            (CallStatus::Declined, CallState::Declined),
            (CallStatus::Canceled, CallState::Canceled),
        ] {
            let mut fixture = start_call().await;
            fixture
                .handle
                .deliver(status_message("call-1", status))
                .await
                .unwrap();
            assert_eq!(
                next_effect(&mut fixture.effects).await,
                CallEffect::Ended { state: expected }
            );
            assert_eq!(fixture.handle.wait_for_terminal().await.unwrap(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_cancel_is_optimistic() {
        let mut fixture = start_call().await;

        assert_eq!(fixture.handle.cancel().await.unwrap(), CallState::Canceled);
        assert_eq!(fixture.handle.state(), CallState::Canceled);
        assert_eq!(
            next_effect(&mut fixture.effects).await,
            CallEffect::Ended {
                state: CallState::Canceled
            }
        );

        let relayed = fixture.signaling.relayed().await;
        assert_eq!(relayed.len(), 1);
        assert_eq!(
            relayed[0].data,
            Some(CallStatusUpdate::canceled("call-1", CancelReason::CallerCanceled).to_data())
        );

        // Second cancel is a no-op.
        assert_eq!(fixture.handle.cancel().await.unwrap(), CallState::Canceled);
        assert_eq!(fixture.signaling.relayed().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_cancel_survives_relay_failure() {
        let fixture = start_call().await;
        fixture.signaling.set_fail_relay(true);
        assert_eq!(fixture.handle.cancel().await.unwrap(), CallState::Canceled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_other_calls_and_message_types() {
        let fixture = start_call().await;

        fixture
            .handle
            .deliver(status_message("call-2", CallStatus::Declined))
            .await
            .unwrap();
        let mut offer = status_message("call-1", CallStatus::Declined);
        offer.message_type = MessageType::Offer;
        fixture.handle.deliver(offer).await.unwrap();
        let mut garbled = status_message("call-1", CallStatus::Declined);
        garbled.data = serde_json::json!({ "status": "maybe" });
        fixture.handle.deliver(garbled).await.unwrap();

        // Paused time only advances once the actor has drained its mailbox.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fixture.handle.state(), CallState::Ringing);
        fixture.handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_goes_straight_to_canceled() {
        let directory = InMemoryCallDirectory::new();
        let signaling = Arc::new(MockSignalingChannel::new());
        let (handle, _task, mut effects) = CallLifecycleController::start(
            "missing",
            &directory,
            signaling.clone(),
            CallConfig::default(),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(handle.state(), CallState::Canceled);
        assert!(handle.snapshot().session.is_none());
        assert_eq!(
            next_effect(&mut effects).await,
            CallEffect::Ended {
                state: CallState::Canceled
            }
        );
        assert!(signaling.relayed().await.is_empty());
    }
}
