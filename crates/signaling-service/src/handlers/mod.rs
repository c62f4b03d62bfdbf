//! HTTP request handlers.

pub mod health;
pub mod signaling;

pub use health::{health_check, metrics_handler, readiness_check};
pub use signaling::{join, leave, ping, poll, relay_message, room_info, stats, websocket_gone};
