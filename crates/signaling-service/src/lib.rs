//! Signaling Service Library
//!
//! HTTP polling relay used by call participants to exchange session setup
//! messages:
//!
//! - Room membership with join/leave notices
//! - Bounded per-room message backlog read with a timestamp cursor
//! - Heartbeat-driven session liveness with background eviction
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> rooms::RoomRegistry -> rooms::RoomActor (one per room)
//!                                        ^
//!                         tasks::session_sweeper (periodic)
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `observability` - Prometheus metrics and health state
//! - `rooms` - Room actors, registry and session index
//! - `routes` - Axum router setup
//! - `tasks` - Background tasks

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod rooms;
pub mod routes;
pub mod tasks;
