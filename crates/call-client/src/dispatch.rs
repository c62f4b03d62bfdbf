//! Poll event dispatcher.
//!
//! Routes the poll loop's output to the controllers that consume it:
//! - `call-status` messages go to the call lifecycle controller
//! - every other message goes to the negotiation sink (offers, answers,
//!   candidates, membership notices)
//! - signaling liveness goes to the reconnection controller

use crate::call::CallHandle;
use crate::reconnect::ReconnectHandle;
use crate::signaling::PollEvent;
use common::call::CALL_STATUS_TYPE;
use common::protocol::RelayMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where poll events are delivered. Absent targets drop their events.
#[derive(Debug, Clone, Default)]
pub struct DispatchTargets {
    pub call: Option<CallHandle>,
    pub reconnect: Option<ReconnectHandle>,
    pub negotiation: Option<mpsc::Sender<RelayMessage>>,
}

/// Run the dispatcher until `cancel_token` fires or the poll loop ends.
pub async fn run_dispatcher(
    mut events: mpsc::Receiver<PollEvent>,
    mut targets: DispatchTargets,
    cancel_token: CancellationToken,
) {
    debug!(target: "call.dispatch", "Dispatcher started");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                debug!(target: "call.dispatch", "Dispatcher cancelled");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => dispatch(event, &mut targets).await,
                    None => {
                        debug!(target: "call.dispatch", "Poll loop ended");
                        break;
                    }
                }
            }
        }
    }
}

async fn dispatch(event: PollEvent, targets: &mut DispatchTargets) {
    match event {
        PollEvent::Message(message) if message.message_type.as_str() == CALL_STATUS_TYPE => {
            if let Some(call) = &targets.call {
                if call.deliver(message).await.is_err() {
                    debug!(target: "call.dispatch", "Call controller gone, dropping status updates");
                    targets.call = None;
                }
            }
        }
        PollEvent::Message(message) => {
            if let Some(sink) = &targets.negotiation {
                if sink.send(message).await.is_err() {
                    debug!(target: "call.dispatch", "Negotiation sink closed");
                    targets.negotiation = None;
                }
            }
        }
        PollEvent::Disconnected => {
            warn!(target: "call.dispatch", "Signaling disconnected");
            if let Some(reconnect) = &targets.reconnect {
                if reconnect.signaling_lost().await.is_err() {
                    targets.reconnect = None;
                }
            }
        }
        PollEvent::Reconnected => {
            info!(target: "call.dispatch", "Signaling reconnected");
            if let Some(reconnect) = &targets.reconnect {
                if reconnect.signaling_restored().await.is_err() {
                    targets.reconnect = None;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::call::{CallLifecycleController, CallSession, CallState, InMemoryCallDirectory};
    use crate::config::{CallConfig, PollerConfig, ReconnectConfig};
    use crate::reconnect::mock::{MockPeerTransport, ScriptedRepair};
    use crate::reconnect::{ConnectionState, ReconnectionController};
    use crate::signaling::mock::MockSignalingChannel;
    use crate::signaling::Poller;
    use common::call::{CallStatus, CallStatusUpdate};
    use common::types::MessageType;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn poller_config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(100),
            failure_threshold: 2,
            heartbeat: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_routes_status_and_negotiation_messages() {
        let signaling = Arc::new(MockSignalingChannel::new());
        let directory = InMemoryCallDirectory::new();
        directory
            .insert(CallSession::new("call-1", "R1", "alice", "bob"))
            .await;
        let cancel = CancellationToken::new();

        let (call, _call_task, _effects) = CallLifecycleController::start(
            "call-1",
            &directory,
            signaling.clone(),
            CallConfig::default(),
            cancel.child_token(),
        )
        .await;

        let (negotiation_tx, mut negotiation_rx) = mpsc::channel(8);
        let (_poller, events) = Poller::spawn(
            signaling.clone(),
            "R1",
            "alice",
            0,
            poller_config(),
            cancel.child_token(),
        );
        tokio::spawn(run_dispatcher(
            events,
            DispatchTargets {
                call: Some(call.clone()),
                reconnect: None,
                negotiation: Some(negotiation_tx),
            },
            cancel.child_token(),
        ));

        signaling
            .push_message("bob", MessageType::Answer, json!({ "sdp": "v=0" }))
            .await;
        signaling
            .push_message(
                "bob",
                CallStatusUpdate::message_type(),
                CallStatusUpdate::new("call-1", CallStatus::Accepted).to_data(),
            )
            .await;

        let answer = negotiation_rx.recv().await.unwrap();
        assert_eq!(answer.message_type, MessageType::Answer);
        assert_eq!(call.wait_for_terminal().await.unwrap(), CallState::Accepted);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_signaling_outage_starts_reconnection() {
        let signaling = Arc::new(MockSignalingChannel::new());
        signaling.set_fail_poll(true);
        let transport = MockPeerTransport::new();
        let cancel = CancellationToken::new();

        let (reconnect, _task) = ReconnectionController::spawn(
            &transport,
            Arc::new(ScriptedRepair::succeeding()),
            None,
            &ReconnectConfig::default(),
            cancel.child_token(),
        );
        let (_poller, events) = Poller::spawn(
            signaling.clone(),
            "R1",
            "alice",
            0,
            poller_config(),
            cancel.child_token(),
        );
        tokio::spawn(run_dispatcher(
            events,
            DispatchTargets {
                reconnect: Some(reconnect.clone()),
                ..DispatchTargets::default()
            },
            cancel.child_token(),
        ));

        let status = reconnect
            .wait_for_state(ConnectionState::Reconnecting)
            .await
            .unwrap();
        assert_eq!(status.attempts, 1);

        signaling.set_fail_poll(false);
        reconnect
            .wait_for_state(ConnectionState::Connected)
            .await
            .unwrap();

        cancel.cancel();
    }
}
