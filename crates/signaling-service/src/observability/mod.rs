//! Observability for the signaling service: Prometheus metrics and
//! liveness/readiness state.

pub mod health;
pub mod metrics;

pub use health::HealthState;
