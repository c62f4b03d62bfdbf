//! Call Lifecycle Controller.
//!
//! Drives an outbound call from `Ringing` to one terminal state, exchanging
//! `call-status` updates with the other party over the signaling relay.

mod controller;
mod directory;
mod state;

pub use controller::{CallEffect, CallHandle, CallLifecycleController, CallSnapshot};
pub use directory::{CallDirectory, CallSession, InMemoryCallDirectory};
pub use state::{transition, CallEvent, CallState};
