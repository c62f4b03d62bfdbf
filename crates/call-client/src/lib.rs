//! Call Client Library
//!
//! Client-side half of call setup on top of the signaling gateway.
//!
//! # Architecture
//!
//! ```text
//! Poller ──PollEvent──▶ dispatcher ──┬──▶ CallLifecycleController (call-status)
//!   │                                ├──▶ ReconnectionController (signaling liveness)
//!   │                                └──▶ negotiation sink (offer/answer/candidates)
//!   ▼
//! SignalingChannel (HttpSignalingClient) ◀── relay: status updates, repair offers
//! ```
//!
//! # Modules
//!
//! - [`signaling`] - Gateway client trait, HTTP implementation, poll loop
//! - [`call`] - Ringing / accepted / declined / canceled / timeout state machine
//! - [`reconnect`] - Backoff-driven connection repair
//! - [`dispatch`] - Routes poll output to the controllers
//! - [`config`] - Timing and retry configuration
//! - [`errors`] - Client error type
//!
//! Every controller is an actor: a spawned task that owns its state and
//! timers, driven through a cloneable handle and observed through a
//! `watch` channel.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod call;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod reconnect;
pub mod signaling;

pub use errors::ClientError;
