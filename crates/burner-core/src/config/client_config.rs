use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::defaults;

/// Client configuration
///
/// Every field has a default, so a config file only needs to name what it
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the room coordinator
    pub server_url: String,

    /// Reconnection policy for the transport session
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::DEFAULT_SERVER_URL.to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Reconnection policy
///
/// Delays grow exponentially from `base_delay_ms` and are capped at
/// `max_delay_ms`. Once `attempts` consecutive attempts have failed the
/// transport reports a terminal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether to retry at all after a failed or dropped connection
    pub enabled: bool,

    /// Maximum consecutive failed attempts
    pub attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Randomization factor in [0, 1] applied to each delay
    pub jitter: f64,

    /// Timeout for a single connection attempt (milliseconds)
    pub connect_timeout_ms: u64,

    /// Grace period for closing the link on disconnect (milliseconds)
    pub shutdown_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: defaults::DEFAULT_RECONNECT_ATTEMPTS,
            base_delay_ms: defaults::DEFAULT_RECONNECT_DELAY_MS,
            max_delay_ms: defaults::DEFAULT_RECONNECT_DELAY_MAX_MS,
            jitter: defaults::DEFAULT_RECONNECT_JITTER,
            connect_timeout_ms: defaults::DEFAULT_CONNECT_TIMEOUT_MS,
            shutdown_timeout_ms: defaults::DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ReconnectConfig {
    /// Policy that gives up on the first failure
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delays(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.enabled && failures <= self.attempts
    }

    /// Backoff delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let max = self.max_delay_ms.max(self.base_delay_ms);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exponent).min(max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || raw == 0 {
            return Duration::from_millis(raw);
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        let scaled = (raw as f64 * factor).round() as u64;
        Duration::from_millis(scaled.min(max))
    }
}

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config: {0}")]
    Parse(String),
}
