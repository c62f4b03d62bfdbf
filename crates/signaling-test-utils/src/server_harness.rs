//! Test server harness for E2E testing
//!
//! Provides `TestSignalingServer` for spawning real signaling service
//! instances in tests.

use metrics_exporter_prometheus::PrometheusBuilder;
use signaling_service::config::Config;
use signaling_service::observability::HealthState;
use signaling_service::rooms::{RegistrySettings, RoomRegistry};
use signaling_service::routes::{self, AppState};
use signaling_service::tasks::run_session_sweeper;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the signaling service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestSignalingServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSignalingServer {
    addr: SocketAddr,
    config: Config,
    registry: Arc<RoomRegistry>,
    cancel_token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestSignalingServer {
    /// Spawn a server with default configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(HashMap::new()).await
    }

    /// Spawn a server with extra `SIGNALING_*` variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Run the session sweeper at the configured interval
    /// - Report ready immediately
    pub async fn spawn_with(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let mut vars = vars;
        vars.insert(
            "SIGNALING_BIND_ADDRESS".to_string(),
            "127.0.0.1:0".to_string(),
        );

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let cancel_token = CancellationToken::new();
        let registry = Arc::new(RoomRegistry::new(
            RegistrySettings::from(&config),
            cancel_token.child_token(),
        ));

        tokio::spawn(run_session_sweeper(
            Arc::clone(&registry),
            config.sweep_interval,
            cancel_token.child_token(),
        ));

        let health = Arc::new(HealthState::new());
        health.set_ready();

        let state = Arc::new(AppState {
            registry: Arc::clone(&registry),
            config: config.clone(),
            health,
        });

        // A recorder that is never installed globally, so many servers can
        // coexist in one test binary.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            registry,
            cancel_token,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Direct access to the registry, for assertions.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}

impl Drop for TestSignalingServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let server = TestSignalingServer::spawn().await?;
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "signaling-service");

        Ok(())
    }

    #[tokio::test]
    async fn test_server_applies_overrides() -> Result<(), anyhow::Error> {
        let server = TestSignalingServer::spawn_with(HashMap::from([(
            "SIGNALING_MAX_BACKLOG".to_string(),
            "5".to_string(),
        )]))
        .await?;
        assert_eq!(server.config().max_backlog, 5);
        assert!(server.addr().ip().is_loopback());

        let response = reqwest::get(format!("{}/ready", server.url())).await?;
        assert_eq!(response.status(), 200);

        Ok(())
    }
}
