//! Session sweeper background task.
//!
//! Periodically evicts participants whose last heartbeat or poll is older
//! than the session timeout, and retires empty rooms idle past retention.
//! Runs independently of request traffic.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered. A sweep already
//! in progress completes first.

use crate::rooms::RoomRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the sweeper loop until `cancel_token` fires.
///
/// The first sweep happens one `interval` after start.
pub async fn run_session_sweeper(
    registry: Arc<RoomRegistry>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "signaling.sweeper",
        interval_secs = interval.as_secs(),
        "Session sweeper started"
    );

    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = registry.sweep().await;
                if report.sessions_evicted > 0 || report.rooms_retired > 0 {
                    info!(
                        target: "signaling.sweeper",
                        sessions_evicted = report.sessions_evicted,
                        rooms_retired = report.rooms_retired,
                        "Sweep removed stale state"
                    );
                } else {
                    debug!(target: "signaling.sweeper", "Sweep found nothing stale");
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "signaling.sweeper",
                    "Session sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}
