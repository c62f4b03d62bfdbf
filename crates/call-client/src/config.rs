//! Call client configuration.
//!
//! Each controller takes its own config struct with production defaults.
//! `ClientConfig` bundles them and can be loaded from `CALL_*` environment
//! variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How long an outbound call rings before timing out.
pub const DEFAULT_RING_TIMEOUT_SECONDS: u64 = 45;

/// Delay between acceptance and the join effect.
pub const DEFAULT_ACCEPT_GRACE_MS: u64 = 1000;

/// First reconnection delay (doubles per attempt).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on reconnection delay.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Consecutive poll failures before signaling is reported down.
pub const DEFAULT_POLL_FAILURE_THRESHOLD: u32 = 3;

/// Timeout for a single gateway request.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Call lifecycle timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallConfig {
    pub ring_timeout: Duration,
    pub accept_grace: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(DEFAULT_RING_TIMEOUT_SECONDS),
            accept_grace: Duration::from_millis(DEFAULT_ACCEPT_GRACE_MS),
        }
    }
}

/// Reconnection backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Check the parameters describe a usable backoff.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero initial delay, a max
    /// delay below the initial delay, or zero attempts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::InvalidValue(
                "initial reconnect delay must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::InvalidValue(format!(
                "max reconnect delay ({}ms) is below initial delay ({}ms)",
                self.max_delay.as_millis(),
                self.initial_delay.as_millis()
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "max reconnect attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Poll loop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub failure_threshold: u32,
    /// Send a heartbeat alongside each poll.
    pub heartbeat: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            failure_threshold: DEFAULT_POLL_FAILURE_THRESHOLD,
            heartbeat: true,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the signaling gateway (e.g., "http://localhost:3001").
    pub signaling_url: String,
    pub request_timeout: Duration,
    pub call: CallConfig,
    pub reconnect: ReconnectConfig,
    pub poller: PollerConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

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

impl ClientConfig {
    /// Defaults pointed at `signaling_url`.
    #[must_use]
    pub fn new(signaling_url: impl Into<String>) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            call: CallConfig::default(),
            reconnect: ReconnectConfig::default(),
            poller: PollerConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let signaling_url = vars
            .get("CALL_SIGNALING_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CALL_SIGNALING_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let request_timeout = Duration::from_secs(parse_var(
            vars,
            "CALL_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);

        let call = CallConfig {
            ring_timeout: Duration::from_secs(parse_var(
                vars,
                "CALL_RING_TIMEOUT_SECONDS",
                DEFAULT_RING_TIMEOUT_SECONDS,
            )?),
            accept_grace: Duration::from_millis(parse_var(
                vars,
                "CALL_ACCEPT_GRACE_MS",
                DEFAULT_ACCEPT_GRACE_MS,
            )?),
        };
        if call.ring_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CALL_RING_TIMEOUT_SECONDS must be > 0".to_string(),
            ));
        }

        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(parse_var(
                vars,
                "CALL_RECONNECT_INITIAL_DELAY_MS",
                DEFAULT_INITIAL_BACKOFF_MS,
            )?),
            max_delay: Duration::from_millis(parse_var(
                vars,
                "CALL_RECONNECT_MAX_DELAY_MS",
                DEFAULT_MAX_BACKOFF_MS,
            )?),
            max_attempts: parse_var(vars, "CALL_RECONNECT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        };
        reconnect.validate()?;

        let poller = PollerConfig {
            interval: Duration::from_millis(parse_var(
                vars,
                "CALL_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            ..PollerConfig::default()
        };
        if poller.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CALL_POLL_INTERVAL_MS must be > 0".to_string(),
            ));
        }

        Ok(Self {
            signaling_url,
            request_timeout,
            call,
            reconnect,
            poller,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([(
            "CALL_SIGNALING_URL".to_string(),
            "http://localhost:3001/".to_string(),
        )])
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_vars(&base_vars()).expect("config should load");
        assert_eq!(config.signaling_url, "http://localhost:3001");
        assert_eq!(config.call.ring_timeout, Duration::from_secs(45));
        assert_eq!(config.call.accept_grace, Duration::from_secs(1));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.poller.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_url() {
        let result = ClientConfig::from_vars(&HashMap::new());
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "CALL_SIGNALING_URL")
        );
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("CALL_RING_TIMEOUT_SECONDS".to_string(), "20".to_string());
        vars.insert("CALL_RECONNECT_MAX_ATTEMPTS".to_string(), "3".to_string());
        let config = ClientConfig::from_vars(&vars).expect("config should load");
        assert_eq!(config.call.ring_timeout, Duration::from_secs(20));
        assert_eq!(config.reconnect.max_attempts, 3);
    }

    #[test]
    fn test_reconnect_validation() {
        assert!(ReconnectConfig::default().validate().is_ok());

        let inverted = ReconnectConfig {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            max_attempts: 3,
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        let no_attempts = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn test_zero_ring_timeout_rejected() {
        let mut vars = base_vars();
        vars.insert("CALL_RING_TIMEOUT_SECONDS".to_string(), "0".to_string());
        assert!(ClientConfig::from_vars(&vars).is_err());
    }
}
