//! Identity to room index.
//!
//! A participant belongs to at most one room. The tracker records which one
//! so heartbeats can be routed and a join into a different room can first
//! remove the participant from the old room. Per-session liveness lives in
//! the owning `RoomActor`; this index only answers "where is this identity".

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SessionTracker {
    rooms_by_identity: HashMap<String, String>,
}

impl SessionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Room currently holding `identity`.
    #[must_use]
    pub fn room_of(&self, identity: &str) -> Option<&str> {
        self.rooms_by_identity.get(identity).map(String::as_str)
    }

    /// Record `identity` as a member of `room_id`. Returns the previous room
    /// if it differed.
    pub fn bind(&mut self, identity: &str, room_id: &str) -> Option<String> {
        self.rooms_by_identity
            .insert(identity.to_string(), room_id.to_string())
            .filter(|previous| previous != room_id)
    }

    /// Forget `identity` if it is bound to `room_id`.
    ///
    /// A stale unbind (the identity has since moved elsewhere) is ignored.
    pub fn unbind(&mut self, identity: &str, room_id: &str) -> bool {
        if self.room_of(identity) == Some(room_id) {
            self.rooms_by_identity.remove(identity);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms_by_identity.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms_by_identity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_lookup() {
        let mut tracker = SessionTracker::new();
        assert_eq!(tracker.bind("alice", "R1"), None);
        assert_eq!(tracker.room_of("alice"), Some("R1"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_rebind_same_room_reports_nothing() {
        let mut tracker = SessionTracker::new();
        tracker.bind("alice", "R1");
        assert_eq!(tracker.bind("alice", "R1"), None);
    }

    #[test]
    fn test_move_reports_previous_room() {
        let mut tracker = SessionTracker::new();
        tracker.bind("alice", "R1");
        assert_eq!(tracker.bind("alice", "R2"), Some("R1".to_string()));
        assert_eq!(tracker.room_of("alice"), Some("R2"));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_stale_unbind_is_ignored() {
        let mut tracker = SessionTracker::new();
        tracker.bind("alice", "R2");
        assert!(!tracker.unbind("alice", "R1"));
        assert_eq!(tracker.room_of("alice"), Some("R2"));
        assert!(tracker.unbind("alice", "R2"));
        assert!(tracker.is_empty());
    }
}
