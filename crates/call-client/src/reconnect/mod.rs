//! Reconnection Controller.
//!
//! Watches a peer transport and the signaling channel, and repairs the
//! connection with exponential backoff when either degrades.

mod backoff;
mod controller;
mod transport;

pub use backoff::BackoffPolicy;
pub use controller::{ConnectionState, ReconnectHandle, ReconnectStatus, ReconnectionController};
pub use transport::{
    mock, DefaultRepair, IceState, PeerTransport, RepairFn, RepairStrategy, SessionDescription,
    TransportState,
};
