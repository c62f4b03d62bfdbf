//! Room registry: owns the room actors and the identity index.
//!
//! Lock order is always `sessions` before `rooms`. Membership changes (join,
//! leave, sweep, and room info since it may evict) hold the `sessions` write
//! lock for their whole duration so they are serialized against each other.
//! Relay and poll only take the `rooms` read lock, held across the actor
//! call, so a room cannot be retired underneath them.

use crate::config::Config;
use crate::errors::SignalingError;
use crate::observability::metrics;

use super::messages::{Envelope, RoomSnapshot};
use super::room::{RoomActor, RoomActorHandle};
use super::tracker::SessionTracker;

use common::protocol::{RelayMessage, RoomState};
use common::types::UserType;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Registry tuning taken from service configuration.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_backlog: usize,
    pub poll_page_size: usize,
    pub session_timeout: Duration,
    pub room_retention: Duration,
}

impl From<&Config> for RegistrySettings {
    fn from(config: &Config) -> Self {
        Self {
            max_backlog: config.max_backlog,
            poll_page_size: config.poll_page_size,
            session_timeout: config.session_timeout,
            room_retention: config.room_retention,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome of one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_evicted: usize,
    pub rooms_retired: usize,
}

pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomActorHandle>>,
    sessions: RwLock<SessionTracker>,
    settings: RegistrySettings,
    cancel_token: CancellationToken,
}

impl RoomRegistry {
    /// Create an empty registry. Room actors are cancelled with
    /// `cancel_token`.
    #[must_use]
    pub fn new(settings: RegistrySettings, cancel_token: CancellationToken) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            sessions: RwLock::new(SessionTracker::new()),
            settings,
            cancel_token,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    async fn get_or_create(&self, room_id: &str) -> RoomActorHandle {
        if let Some(room) = self.rooms.read().await.get(room_id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let (room, _task) = RoomActor::spawn(
            room_id.to_string(),
            self.settings.max_backlog,
            self.cancel_token.child_token(),
        );
        rooms.insert(room_id.to_string(), room.clone());
        metrics::set_rooms_active(rooms.len());

        info!(
            target: "signaling.registry",
            room_id = %room_id,
            rooms = rooms.len(),
            "Room created"
        );
        room
    }

    /// Join `room_id`, creating it if needed.
    ///
    /// Returns the participants already present, excluding the joiner. A
    /// participant who is a member of another room is removed from it first.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        user_type: UserType,
    ) -> Result<RoomState, SignalingError> {
        let mut sessions = self.sessions.write().await;

        let previous = sessions
            .room_of(user_id)
            .filter(|current| *current != room_id)
            .map(str::to_string);
        if let Some(previous) = previous {
            let old_room = self.rooms.read().await.get(&previous).cloned();
            if let Some(old_room) = old_room {
                old_room.leave(user_id.to_string()).await?;
            }
            sessions.unbind(user_id, &previous);
            debug!(
                target: "signaling.registry",
                user_id = %user_id,
                from_room = %previous,
                to_room = %room_id,
                "Participant moved rooms"
            );
        }

        let room = self.get_or_create(room_id).await;
        let outcome = room.join(user_id.to_string(), user_type).await?;
        sessions.bind(user_id, room_id);

        Ok(RoomState {
            users: outcome.others,
            room_id: room_id.to_string(),
        })
    }

    /// Leave `room_id`.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if the room does not exist. Leaving a room one is not a
    /// member of is not an error.
    #[instrument(skip_all, fields(room_id = %room_id, user_id = %user_id))]
    pub async fn leave(&self, room_id: &str, user_id: &str) -> Result<(), SignalingError> {
        let mut sessions = self.sessions.write().await;

        let room = self
            .rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.to_string()))?;

        room.leave(user_id.to_string()).await?;
        sessions.unbind(user_id, room_id);
        Ok(())
    }

    /// Append a message to `room_id`'s backlog.
    pub async fn relay(
        &self,
        room_id: &str,
        envelope: Envelope,
    ) -> Result<RelayMessage, SignalingError> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.to_string()))?;
        room.relay(envelope).await
    }

    /// Messages after `since` deliverable to `user_id`, one page at most.
    ///
    /// An unknown room yields an empty list.
    pub async fn poll(
        &self,
        room_id: &str,
        user_id: &str,
        since: i64,
    ) -> Result<Vec<RelayMessage>, SignalingError> {
        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => {
                room.poll(user_id.to_string(), since, self.settings.poll_page_size)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Refresh liveness for `user_id`. Returns `false` for unknown
    /// identities, which are otherwise ignored.
    pub async fn heartbeat(&self, user_id: &str) -> Result<bool, SignalingError> {
        let sessions = self.sessions.read().await;
        let Some(room_id) = sessions.room_of(user_id) else {
            debug!(
                target: "signaling.registry",
                user_id = %user_id,
                "Heartbeat for unknown identity ignored"
            );
            return Ok(false);
        };

        let rooms = self.rooms.read().await;
        match rooms.get(room_id) {
            Some(room) => room.touch(user_id.to_string()).await,
            None => Ok(false),
        }
    }

    /// Snapshot of `room_id`, or `None` if it does not exist.
    ///
    /// Participants past the session timeout are evicted before the snapshot
    /// is taken, so the result never lags behind the sweeper.
    pub async fn room_info(&self, room_id: &str) -> Result<Option<RoomSnapshot>, SignalingError> {
        let mut sessions = self.sessions.write().await;
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(room_id) else {
            return Ok(None);
        };

        let snapshot = room.live_info(self.settings.session_timeout).await?;
        if !snapshot.evicted.is_empty() {
            for user_id in &snapshot.evicted {
                sessions.unbind(user_id, room_id);
            }
            metrics::record_sessions_evicted(snapshot.evicted.len() as u64);
        }
        Ok(Some(snapshot))
    }

    /// Evict idle sessions and retire empty rooms idle past retention.
    #[instrument(skip_all, name = "signaling.registry.sweep")]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut sessions = self.sessions.write().await;

        let handles: Vec<RoomActorHandle> = self.rooms.read().await.values().cloned().collect();
        for room in handles {
            match room.evict(self.settings.session_timeout).await {
                Ok(evicted) => {
                    for user_id in &evicted {
                        sessions.unbind(user_id, room.room_id());
                    }
                    report.sessions_evicted += evicted.len();
                }
                Err(e) => {
                    warn!(
                        target: "signaling.registry",
                        room_id = %room.room_id(),
                        error = %e,
                        "Eviction failed for room"
                    );
                }
            }
        }

        let mut rooms = self.rooms.write().await;
        let room_ids: Vec<String> = rooms.keys().cloned().collect();
        for room_id in room_ids {
            let Some(room) = rooms.get(&room_id) else {
                continue;
            };
            let retire = match room.info().await {
                Ok(snapshot) => {
                    snapshot.is_empty()
                        && snapshot.last_activity.elapsed() >= self.settings.room_retention
                }
                Err(e) => {
                    warn!(
                        target: "signaling.registry",
                        room_id = %room_id,
                        error = %e,
                        "Room actor unresponsive, removing"
                    );
                    true
                }
            };
            if retire {
                if let Some(room) = rooms.remove(&room_id) {
                    room.cancel();
                }
                report.rooms_retired += 1;
                debug!(target: "signaling.registry", room_id = %room_id, "Room retired");
            }
        }
        metrics::set_rooms_active(rooms.len());

        if report.sessions_evicted > 0 {
            metrics::record_sessions_evicted(report.sessions_evicted as u64);
        }

        report
    }

    /// Number of live rooms and tracked sessions.
    pub async fn stats(&self) -> (usize, usize) {
        let sessions = self.sessions.read().await.len();
        let rooms = self.rooms.read().await.len();
        (rooms, sessions)
    }

    /// Stop every room actor.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
