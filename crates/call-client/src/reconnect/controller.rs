//! `ReconnectionController` - per-connection actor that restores a degraded
//! peer transport with exponential backoff.
//!
//! The actor owns one backoff timer and at most one in-flight repair. Every
//! repair is tagged with a generation number; `reset`, recovery and manual
//! retry bump the generation so a late result from an abandoned attempt is
//! discarded instead of moving the state.

use super::backoff::BackoffPolicy;
use super::transport::{IceState, PeerTransport, RepairStrategy, TransportState};
use crate::config::ReconnectConfig;
use crate::errors::ClientError;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for the controller mailbox.
const RECONNECT_CHANNEL_BUFFER: usize = 64;

/// Connection health as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connected,
    /// Degraded but not yet repairing (ICE dropped, may recover on its own).
    Disconnected,
    Reconnecting,
    /// Automatic attempts exhausted; only a manual retry leaves this state.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        })
    }
}

/// Observable reconnection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectStatus {
    pub state: ConnectionState,
    /// Current attempt number (1-based); 0 when connected.
    pub attempts: u32,
    /// When the pending attempt fires; `None` while idle or repairing.
    pub next_retry_at: Option<Instant>,
    /// Delay used for the current attempt.
    pub last_delay: Option<Duration>,
}

impl ReconnectStatus {
    fn connected() -> Self {
        Self {
            state: ConnectionState::Connected,
            attempts: 0,
            next_retry_at: None,
            last_delay: None,
        }
    }

    /// Countdown until the pending attempt.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.next_retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

enum ReconnectCommand {
    SignalingLost,
    SignalingRestored,
    ManualRetry {
        respond_to: oneshot::Sender<ReconnectStatus>,
    },
    Reset {
        respond_to: oneshot::Sender<ReconnectStatus>,
    },
}

/// Handle to a `ReconnectionController`.
#[derive(Clone, Debug)]
pub struct ReconnectHandle {
    sender: mpsc::Sender<ReconnectCommand>,
    status: watch::Receiver<ReconnectStatus>,
    cancel_token: CancellationToken,
}

impl ReconnectHandle {
    #[must_use]
    pub fn status(&self) -> ReconnectStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ReconnectStatus> {
        self.status.clone()
    }

    async fn send(&self, command: ReconnectCommand) -> Result<(), ClientError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<ReconnectStatus>) -> ReconnectCommand,
    ) -> Result<ReconnectStatus, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| ClientError::ChannelClosed)
    }

    /// The signaling channel stopped answering.
    pub async fn signaling_lost(&self) -> Result<(), ClientError> {
        self.send(ReconnectCommand::SignalingLost).await
    }

    /// The signaling channel answers again.
    pub async fn signaling_restored(&self) -> Result<(), ClientError> {
        self.send(ReconnectCommand::SignalingRestored).await
    }

    /// Restart the retry loop at attempt 0. Ignored while reconnecting.
    pub async fn manual_retry(&self) -> Result<ReconnectStatus, ClientError> {
        self.request(|respond_to| ReconnectCommand::ManualRetry { respond_to })
            .await
    }

    /// Drop any pending attempt and report `Connected`.
    pub async fn reset(&self) -> Result<ReconnectStatus, ClientError> {
        self.request(|respond_to| ReconnectCommand::Reset { respond_to })
            .await
    }

    /// Wait until the controller reports `state`.
    pub async fn wait_for_state(
        &self,
        state: ConnectionState,
    ) -> Result<ReconnectStatus, ClientError> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| s.state == state)
            .await
            .map_err(|_| ClientError::ChannelClosed)?;
        Ok(*reached)
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// The per-connection actor.
pub struct ReconnectionController {
    repair: Arc<dyn RepairStrategy>,
    policy: BackoffPolicy,
    transport_states: watch::Receiver<TransportState>,
    ice_states: watch::Receiver<IceState>,
    watch_transport: bool,
    watch_ice: bool,
    signaling_up: bool,
    state: ConnectionState,
    attempt: u32,
    retry_at: Option<Instant>,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    outcomes_tx: mpsc::Sender<(u64, Result<(), ClientError>)>,
    outcomes: mpsc::Receiver<(u64, Result<(), ClientError>)>,
    receiver: mpsc::Receiver<ReconnectCommand>,
    status: watch::Sender<ReconnectStatus>,
    cancel_token: CancellationToken,
}

impl ReconnectionController {
    /// Spawn a controller watching `transport`.
    ///
    /// `custom_repair` takes precedence over `default_repair` when present.
    pub fn spawn(
        transport: &dyn PeerTransport,
        default_repair: Arc<dyn RepairStrategy>,
        custom_repair: Option<Arc<dyn RepairStrategy>>,
        config: &ReconnectConfig,
        cancel_token: CancellationToken,
    ) -> (ReconnectHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(RECONNECT_CHANNEL_BUFFER);
        let (outcomes_tx, outcomes) = mpsc::channel(1);
        let (status, status_rx) = watch::channel(ReconnectStatus::connected());

        let actor = Self {
            repair: custom_repair.unwrap_or(default_repair),
            policy: BackoffPolicy::new(config),
            transport_states: transport.connection_state(),
            ice_states: transport.ice_state(),
            watch_transport: true,
            watch_ice: true,
            signaling_up: true,
            state: ConnectionState::Connected,
            attempt: 0,
            retry_at: None,
            generation: 0,
            in_flight: None,
            outcomes_tx,
            outcomes,
            receiver,
            status,
            cancel_token: cancel_token.clone(),
        };

        let task = tokio::spawn(actor.run());
        let handle = ReconnectHandle {
            sender,
            status: status_rx,
            cancel_token,
        };
        (handle, task)
    }

    #[instrument(skip_all, name = "call.reconnect")]
    async fn run(mut self) {
        info!(
            target: "call.reconnect",
            max_attempts = self.policy.max_attempts(),
            "Reconnection controller started"
        );

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "call.reconnect", "Reconnection controller cancelled");
                    break;
                }
                () = sleep_until_opt(retry_at), if retry_at.is_some() => {
                    self.start_attempt();
                }
                changed = self.transport_states.changed(), if self.watch_transport => {
                    if changed.is_ok() {
                        let state = *self.transport_states.borrow_and_update();
                        self.on_transport_state(state);
                    } else {
                        self.watch_transport = false;
                    }
                }
                changed = self.ice_states.changed(), if self.watch_ice => {
                    if changed.is_ok() {
                        let state = *self.ice_states.borrow_and_update();
                        self.on_ice_state(state);
                    } else {
                        self.watch_ice = false;
                    }
                }
                Some((generation, outcome)) = self.outcomes.recv() => {
                    self.on_outcome(generation, outcome);
                }
                command = self.receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!(target: "call.reconnect", "All reconnect handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        self.abandon_attempt();
        info!(target: "call.reconnect", state = %self.state, "Reconnection controller stopped");
    }

    fn handle_command(&mut self, command: ReconnectCommand) {
        match command {
            ReconnectCommand::SignalingLost => {
                self.signaling_up = false;
                self.trigger("signaling_disconnected");
            }
            ReconnectCommand::SignalingRestored => {
                if !self.signaling_up {
                    self.signaling_up = true;
                    debug!(target: "call.reconnect", state = %self.state, "Signaling restored");
                }
            }
            ReconnectCommand::ManualRetry { respond_to } => {
                if self.state == ConnectionState::Reconnecting {
                    debug!(target: "call.reconnect", "Manual retry ignored while reconnecting");
                } else {
                    info!(target: "call.reconnect", from = %self.state, "Manual retry");
                    self.abandon_attempt();
                    self.schedule(0);
                }
                let _ = respond_to.send(*self.status.borrow());
            }
            ReconnectCommand::Reset { respond_to } => {
                self.abandon_attempt();
                self.mark_connected();
                let _ = respond_to.send(*self.status.borrow());
            }
        }
    }

    fn on_transport_state(&mut self, state: TransportState) {
        match state {
            TransportState::Disconnected => self.trigger("transport_disconnected"),
            TransportState::Failed => self.trigger("transport_failed"),
            TransportState::Connected => self.on_recovered("transport_connected"),
            _ => {}
        }
    }

    fn on_ice_state(&mut self, state: IceState) {
        match state {
            IceState::Failed => self.trigger("ice_failed"),
            IceState::Disconnected => {
                if self.state == ConnectionState::Connected {
                    info!(target: "call.reconnect", "ICE disconnected");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
            IceState::Connected | IceState::Completed => self.on_recovered("ice_connected"),
            _ => {}
        }
    }

    /// Enter the retry loop unless one is already running or has failed.
    fn trigger(&mut self, reason: &'static str) {
        match self.state {
            ConnectionState::Connected | ConnectionState::Disconnected => {
                warn!(target: "call.reconnect", reason, "Connection degraded, starting reconnection");
                self.schedule(0);
            }
            ConnectionState::Reconnecting | ConnectionState::Failed => {
                debug!(target: "call.reconnect", reason, state = %self.state, "Degradation ignored");
            }
        }
    }

    /// The transport came back on its own.
    fn on_recovered(&mut self, reason: &'static str) {
        match self.state {
            ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                info!(target: "call.reconnect", reason, "Connection recovered");
                self.abandon_attempt();
                self.mark_connected();
            }
            ConnectionState::Connected | ConnectionState::Failed => {}
        }
    }

    /// Arm the backoff timer for attempt `attempt`.
    fn schedule(&mut self, attempt: u32) {
        let delay = self.policy.delay_for(attempt);
        let retry_at = Instant::now() + delay;
        self.attempt = attempt;
        self.retry_at = Some(retry_at);
        self.state = ConnectionState::Reconnecting;
        self.status.send_replace(ReconnectStatus {
            state: ConnectionState::Reconnecting,
            attempts: attempt.saturating_add(1),
            next_retry_at: Some(retry_at),
            last_delay: Some(delay),
        });
        debug!(
            target: "call.reconnect",
            attempt = attempt.saturating_add(1),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnect attempt scheduled"
        );
    }

    /// Backoff elapsed: run the repair off the actor loop.
    fn start_attempt(&mut self) {
        self.retry_at = None;
        self.generation = self.generation.wrapping_add(1);
        self.status.send_modify(|status| status.next_retry_at = None);

        let repair = Arc::clone(&self.repair);
        let outcomes = self.outcomes_tx.clone();
        let generation = self.generation;
        info!(
            target: "call.reconnect",
            attempt = self.attempt.saturating_add(1),
            "Attempting connection repair"
        );
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = repair.repair().await;
            let _ = outcomes.send((generation, outcome)).await;
        }));
    }

    fn on_outcome(&mut self, generation: u64, outcome: Result<(), ClientError>) {
        if generation != self.generation || self.state != ConnectionState::Reconnecting {
            debug!(target: "call.reconnect", generation, "Discarding stale repair outcome");
            return;
        }
        self.in_flight = None;

        match outcome {
            Ok(()) => {
                info!(
                    target: "call.reconnect",
                    attempt = self.attempt.saturating_add(1),
                    "Connection repaired"
                );
                self.mark_connected();
            }
            Err(e) if self.policy.is_exhausted(self.attempt) => {
                warn!(
                    target: "call.reconnect",
                    error = %e,
                    attempts = self.attempt.saturating_add(1),
                    "Reconnection failed, giving up"
                );
                self.state = ConnectionState::Failed;
                self.status.send_modify(|status| {
                    status.state = ConnectionState::Failed;
                    status.next_retry_at = None;
                });
            }
            Err(e) => {
                warn!(
                    target: "call.reconnect",
                    error = %e,
                    attempt = self.attempt.saturating_add(1),
                    "Repair attempt failed"
                );
                self.schedule(self.attempt.saturating_add(1));
            }
        }
    }

    /// Cancel the pending timer and any in-flight repair.
    fn abandon_attempt(&mut self) {
        self.retry_at = None;
        self.generation = self.generation.wrapping_add(1);
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }

    fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        self.status.send_if_modified(|status| {
            let connected = ReconnectStatus::connected();
            if *status == connected {
                false
            } else {
                *status = connected;
                true
            }
        });
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.status.send_modify(|status| status.state = state);
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
