//! Signaling service configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! match the polling clients already in the field.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default service name reported by `/health`.
pub const DEFAULT_SERVICE_NAME: &str = "signaling-service";

/// Default number of messages retained per room.
pub const DEFAULT_MAX_BACKLOG: usize = 100;

/// Default maximum number of messages returned by one poll.
pub const DEFAULT_POLL_PAGE_SIZE: usize = 20;

/// Default liveness window for participant sessions.
pub const DEFAULT_SESSION_TIMEOUT_SECONDS: u64 = 30;

/// Default interval between eviction sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 5;

/// Default time an empty room is kept before it is dropped.
pub const DEFAULT_ROOM_RETENTION_SECONDS: u64 = 300;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Signaling service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Service name reported by the health endpoint.
    pub service_name: String,

    /// Messages retained per room; older entries are dropped.
    pub max_backlog: usize,

    /// Maximum messages returned by a single poll.
    pub poll_page_size: usize,

    /// Sessions not seen for this long are evicted.
    pub session_timeout: Duration,

    /// Interval of the background eviction sweep.
    pub sweep_interval: Duration,

    /// Empty rooms idle for this long are dropped.
    pub room_retention: Duration,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Drain period after a shutdown signal.
    pub drain_period: Duration,

    /// Emit JSON formatted logs.
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            max_backlog: DEFAULT_MAX_BACKLOG,
            poll_page_size: DEFAULT_POLL_PAGE_SIZE,
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECONDS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS),
            room_retention: Duration::from_secs(DEFAULT_ROOM_RETENTION_SECONDS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            drain_period: Duration::ZERO,
            json_logs: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Parse an optional variable, rejecting values that do not parse.
fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
        None => Ok(default),
    }
}

/// Parse a variable that must be strictly positive.
fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value: u64 = parse_var(vars, name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("SIGNALING_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let service_name = vars
            .get("SIGNALING_SERVICE_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        #[allow(clippy::cast_possible_truncation)]
        let max_backlog =
            parse_positive(vars, "SIGNALING_MAX_BACKLOG", DEFAULT_MAX_BACKLOG as u64)? as usize;

        #[allow(clippy::cast_possible_truncation)]
        let poll_page_size =
            parse_positive(vars, "SIGNALING_POLL_PAGE_SIZE", DEFAULT_POLL_PAGE_SIZE as u64)?
                as usize;

        let session_timeout = Duration::from_secs(parse_positive(
            vars,
            "SIGNALING_SESSION_TIMEOUT_SECONDS",
            DEFAULT_SESSION_TIMEOUT_SECONDS,
        )?);

        let sweep_interval = Duration::from_secs(parse_positive(
            vars,
            "SIGNALING_SWEEP_INTERVAL_SECONDS",
            DEFAULT_SWEEP_INTERVAL_SECONDS,
        )?);

        let room_retention = Duration::from_secs(parse_var(
            vars,
            "SIGNALING_ROOM_RETENTION_SECONDS",
            DEFAULT_ROOM_RETENTION_SECONDS,
        )?);

        let request_timeout = Duration::from_secs(parse_positive(
            vars,
            "SIGNALING_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);

        let drain_period = Duration::from_secs(parse_var(vars, "SIGNALING_DRAIN_SECONDS", 0)?);

        let json_logs = parse_var(vars, "SIGNALING_LOG_JSON", false)?;

        Ok(Config {
            bind_address,
            service_name,
            max_backlog,
            poll_page_size,
            session_timeout,
            sweep_interval,
            room_retention,
            request_timeout,
            drain_period,
            json_logs,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
        assert_eq!(config.max_backlog, 100);
        assert_eq!(config.poll_page_size, 20);
        assert_eq!(config.session_timeout, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.room_retention, Duration::from_secs(300));
        assert_eq!(config.drain_period, Duration::ZERO);
        assert!(!config.json_logs);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "SIGNALING_BIND_ADDRESS".to_string(),
                "127.0.0.1:4000".to_string(),
            ),
            ("SIGNALING_SERVICE_NAME".to_string(), "relay-eu".to_string()),
            ("SIGNALING_MAX_BACKLOG".to_string(), "250".to_string()),
            ("SIGNALING_POLL_PAGE_SIZE".to_string(), "50".to_string()),
            (
                "SIGNALING_SESSION_TIMEOUT_SECONDS".to_string(),
                "10".to_string(),
            ),
            ("SIGNALING_DRAIN_SECONDS".to_string(), "15".to_string()),
            ("SIGNALING_LOG_JSON".to_string(), "true".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:4000");
        assert_eq!(config.service_name, "relay-eu");
        assert_eq!(config.max_backlog, 250);
        assert_eq!(config.poll_page_size, 50);
        assert_eq!(config.session_timeout, Duration::from_secs(10));
        assert_eq!(config.drain_period, Duration::from_secs(15));
        assert!(config.json_logs);
    }

    #[test]
    fn test_zero_backlog_rejected() {
        let vars = HashMap::from([("SIGNALING_MAX_BACKLOG".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_unparseable_value_rejected() {
        let vars = HashMap::from([(
            "SIGNALING_SESSION_TIMEOUT_SECONDS".to_string(),
            "thirty".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("SIGNALING_SESSION_TIMEOUT_SECONDS"))
        );
    }
}
