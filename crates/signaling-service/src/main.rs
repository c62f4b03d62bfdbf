//! Signaling Service
//!
//! HTTP polling relay for call setup.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus metrics recorder
//! 3. Create the room registry
//! 4. Spawn the session sweeper
//! 5. Serve HTTP until SIGINT/SIGTERM, then drain and stop room actors

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use signaling_service::config::Config;
use signaling_service::observability::metrics::init_metrics_recorder;
use signaling_service::observability::HealthState;
use signaling_service::rooms::{RegistrySettings, RoomRegistry};
use signaling_service::routes::{self, AppState};
use signaling_service::tasks::run_session_sweeper;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first so the log format can follow it
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signaling_service=debug,tower_http=debug".into());
    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Signaling Service");
    info!(
        bind_address = %config.bind_address,
        service_name = %config.service_name,
        max_backlog = config.max_backlog,
        poll_page_size = config.poll_page_size,
        session_timeout_secs = config.session_timeout.as_secs(),
        sweep_interval_secs = config.sweep_interval.as_secs(),
        room_retention_secs = config.room_retention.as_secs(),
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());
    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(RoomRegistry::new(
        RegistrySettings::from(&config),
        shutdown_token.child_token(),
    ));

    let sweeper_handle = tokio::spawn(run_session_sweeper(
        Arc::clone(&registry),
        config.sweep_interval,
        shutdown_token.child_token(),
    ));

    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        config: config.clone(),
        health: Arc::clone(&health_state),
    });
    let app = routes::build_routes(state, prometheus_handle);

    let bind_address: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        format!("Invalid bind address: {e}")
    })?;
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "Signaling Service listening");

    health_state.set_ready();

    let drain_period = config.drain_period;
    let shutdown_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_health.set_not_ready();
            drain(drain_period).await;
        })
        .await?;

    info!("HTTP server stopped, stopping background tasks");
    shutdown_token.cancel();
    registry.shutdown();
    if let Err(e) = sweeper_handle.await {
        warn!(error = %e, "Session sweeper task ended abnormally");
    }

    info!("Signaling Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Keep serving in-flight requests for `period` after readiness drops.
async fn drain(period: Duration) {
    if period.is_zero() {
        info!("Skipping drain period (SIGNALING_DRAIN_SECONDS=0)");
        return;
    }
    warn!("Draining connections for {} seconds...", period.as_secs());
    tokio::time::sleep(period).await;
    info!("Drain period complete");
}
