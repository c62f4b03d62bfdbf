//! Common utilities and types shared across the call signaling components.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for tagged message and participant types
pub mod types;

/// Module for HTTP request/response bodies of the signaling gateway
pub mod protocol;

/// Module for call status payloads carried over the relay
pub mod call;
