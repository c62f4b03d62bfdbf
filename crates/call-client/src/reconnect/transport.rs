//! Peer transport seam and connection repair strategies.
//!
//! The media transport itself lives outside this crate. The reconnection
//! controller only observes its state signals and asks it for an ICE restart
//! and a fresh offer.

use crate::errors::ClientError;
use crate::signaling::SignalingChannel;
use common::protocol::RelayRequest;
use common::types::MessageType;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Coarse connection state of the peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE connection state of the peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Offer or answer exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }
}

/// The peer transport as seen by the reconnection controller.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Connection-state signal.
    fn connection_state(&self) -> watch::Receiver<TransportState>;

    /// ICE-connection-state signal.
    fn ice_state(&self) -> watch::Receiver<IceState>;

    async fn restart_ice(&self) -> Result<(), ClientError>;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, ClientError>;

    async fn set_local_description(
        &self,
        description: &SessionDescription,
    ) -> Result<(), ClientError>;
}

/// One attempt at restoring a degraded connection.
#[async_trait::async_trait]
pub trait RepairStrategy: Send + Sync {
    async fn repair(&self) -> Result<(), ClientError>;
}

/// Adapts an async closure into a [`RepairStrategy`].
pub struct RepairFn<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut> RepairStrategy for RepairFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ClientError>> + Send,
{
    async fn repair(&self) -> Result<(), ClientError> {
        (self.0)().await
    }
}

/// ICE restart plus renegotiation relayed through the signaling gateway.
pub struct DefaultRepair {
    transport: Arc<dyn PeerTransport>,
    signaling: Arc<dyn SignalingChannel>,
    room_id: String,
    user_id: String,
    /// Recipient of the offer; `None` broadcasts to the room.
    peer_id: Option<String>,
}

impl DefaultRepair {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        signaling: Arc<dyn SignalingChannel>,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        peer_id: Option<String>,
    ) -> Self {
        Self {
            transport,
            signaling,
            room_id: room_id.into(),
            user_id: user_id.into(),
            peer_id,
        }
    }
}

#[async_trait::async_trait]
impl RepairStrategy for DefaultRepair {
    #[instrument(skip_all, fields(room_id = %self.room_id, user_id = %self.user_id))]
    async fn repair(&self) -> Result<(), ClientError> {
        self.transport.restart_ice().await?;
        let offer = self.transport.create_offer(true).await?;
        self.transport.set_local_description(&offer).await?;

        let data = serde_json::to_value(&offer).map_err(|e| ClientError::Decode(e.to_string()))?;
        let mut request =
            RelayRequest::new(&self.room_id, &self.user_id, &MessageType::Offer).with_data(data);
        if let Some(peer) = &self.peer_id {
            request = request.to(peer);
        }
        let message_id = self.signaling.relay(request).await?;
        debug!(target: "call.reconnect", message_id = %message_id, "Renegotiation offer relayed");
        Ok(())
    }
}

/// Test doubles for the transport seam.
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    /// Peer transport whose state signals are driven by the test.
    pub struct MockPeerTransport {
        state: watch::Sender<TransportState>,
        ice: watch::Sender<IceState>,
        restarts: AtomicUsize,
        offers: AtomicUsize,
        fail_restart: AtomicBool,
    }

    impl Default for MockPeerTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockPeerTransport {
        /// A connected transport.
        pub fn new() -> Self {
            let (state, _) = watch::channel(TransportState::Connected);
            let (ice, _) = watch::channel(IceState::Connected);
            Self {
                state,
                ice,
                restarts: AtomicUsize::new(0),
                offers: AtomicUsize::new(0),
                fail_restart: AtomicBool::new(false),
            }
        }

        pub fn set_state(&self, state: TransportState) {
            self.state.send_replace(state);
        }

        pub fn set_ice(&self, ice: IceState) {
            self.ice.send_replace(ice);
        }

        pub fn set_fail_restart(&self, fail: bool) {
            self.fail_restart.store(fail, Ordering::SeqCst);
        }

        pub fn restart_count(&self) -> usize {
            self.restarts.load(Ordering::SeqCst)
        }

        pub fn offer_count(&self) -> usize {
            self.offers.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl PeerTransport for MockPeerTransport {
        fn connection_state(&self) -> watch::Receiver<TransportState> {
            self.state.subscribe()
        }

        fn ice_state(&self) -> watch::Receiver<IceState> {
            self.ice.subscribe()
        }

        async fn restart_ice(&self) -> Result<(), ClientError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            if self.fail_restart.load(Ordering::SeqCst) {
                return Err(ClientError::PeerTransport("mock ICE restart failure".to_string()));
            }
            Ok(())
        }

        async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, ClientError> {
            let n = self.offers.fetch_add(1, Ordering::SeqCst);
            Ok(SessionDescription::offer(format!(
                "v=0 mock-offer-{n} ice-restart={ice_restart}"
            )))
        }

        async fn set_local_description(
            &self,
            _description: &SessionDescription,
        ) -> Result<(), ClientError> {
            Ok(())
        }
    }

    /// Repair strategy that replays scripted outcomes and records when it
    /// was invoked.
    pub struct ScriptedRepair {
        outcomes: Mutex<VecDeque<Result<(), ClientError>>>,
        succeed_when_empty: bool,
        attempts: Mutex<Vec<Instant>>,
    }

    impl ScriptedRepair {
        /// Every attempt fails.
        pub fn failing() -> Self {
            Self {
                outcomes: Mutex::new(VecDeque::new()),
                succeed_when_empty: false,
                attempts: Mutex::new(Vec::new()),
            }
        }

        /// Every attempt succeeds.
        pub fn succeeding() -> Self {
            Self {
                succeed_when_empty: true,
                ..Self::failing()
            }
        }

        /// Replay `outcomes` in order, then succeed.
        pub fn with_outcomes(outcomes: Vec<Result<(), ClientError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                succeed_when_empty: true,
                attempts: Mutex::new(Vec::new()),
            }
        }

        /// When each attempt started.
        pub async fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl RepairStrategy for ScriptedRepair {
        async fn repair(&self) -> Result<(), ClientError> {
            self.attempts.lock().await.push(Instant::now());
            match self.outcomes.lock().await.pop_front() {
                Some(outcome) => outcome,
                None if self.succeed_when_empty => Ok(()),
                None => Err(ClientError::PeerTransport("scripted failure".to_string())),
            }
        }
    }
}
