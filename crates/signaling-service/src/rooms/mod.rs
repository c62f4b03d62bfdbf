//! Room registry and session tracking.
//!
//! One `RoomActor` task per room owns that room's sessions and backlog. The
//! `RoomRegistry` maps room ids to actor handles and keeps the identity to
//! room index used for heartbeats and room switches.

pub mod messages;
pub mod registry;
pub mod room;
pub mod tracker;

pub use messages::{Envelope, JoinOutcome, RoomSnapshot};
pub use registry::{RegistrySettings, RoomRegistry, SweepReport};
pub use room::{RoomActor, RoomActorHandle};
pub use tracker::SessionTracker;
