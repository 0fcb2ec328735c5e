//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::signer::DEFAULT_MAX_AGE_SECS;
use crate::transport::USER_AGENT_VALUE;

/// Hard ceiling for a discovered manifest (1 MiB).
pub const MAX_MANIFEST_BYTES: usize = 1_048_576;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for operation calls, registration and token requests, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Per-location timeout for manifest discovery, in seconds.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    /// Manifest body ceiling. Values above [`MAX_MANIFEST_BYTES`] are clamped.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,

    /// User-Agent header for outgoing requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Default replay window for signature verification, in seconds.
    #[serde(default = "default_replay_window")]
    pub replay_window_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_discovery_timeout() -> u64 {
    10
}

fn default_max_manifest_bytes() -> usize {
    MAX_MANIFEST_BYTES
}

fn default_user_agent() -> String {
    USER_AGENT_VALUE.to_string()
}

fn default_replay_window() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
            max_manifest_bytes: default_max_manifest_bytes(),
            user_agent: default_user_agent(),
            replay_window_secs: default_replay_window(),
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `IAJSON_TIMEOUT` | Request timeout in seconds |
    /// | `IAJSON_DISCOVERY_TIMEOUT` | Discovery timeout in seconds |
    /// | `IAJSON_USER_AGENT` | User-Agent override |
    /// | `IAJSON_REPLAY_WINDOW` | Signature replay window in seconds |
    pub fn from_env() -> Self {
        Self {
            timeout_secs: std::env::var("IAJSON_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            discovery_timeout_secs: std::env::var("IAJSON_DISCOVERY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_discovery_timeout),
            max_manifest_bytes: default_max_manifest_bytes(),
            user_agent: std::env::var("IAJSON_USER_AGENT")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_user_agent),
            replay_window_secs: std::env::var("IAJSON_REPLAY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_replay_window),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_discovery_timeout(mut self, secs: u64) -> Self {
        self.discovery_timeout_secs = secs;
        self
    }

    pub fn with_max_manifest_bytes(mut self, limit: usize) -> Self {
        self.max_manifest_bytes = limit;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    /// Effective manifest ceiling.
    pub fn manifest_limit(&self) -> usize {
        self.max_manifest_bytes.min(MAX_MANIFEST_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        std::env::remove_var("IAJSON_TIMEOUT");
        std::env::remove_var("IAJSON_DISCOVERY_TIMEOUT");
        std::env::remove_var("IAJSON_USER_AGENT");
        std::env::remove_var("IAJSON_REPLAY_WINDOW");

        let config = ClientConfig::from_env();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.discovery_timeout_secs, 10);
        assert_eq!(config.replay_window_secs, 60);
        assert!(config.user_agent.starts_with("iajson-client/"));
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        std::env::set_var("IAJSON_TIMEOUT", "5");
        std::env::set_var("IAJSON_DISCOVERY_TIMEOUT", "not-a-number");
        let config = ClientConfig::from_env();
        std::env::remove_var("IAJSON_TIMEOUT");
        std::env::remove_var("IAJSON_DISCOVERY_TIMEOUT");

        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_manifest_limit_is_clamped() {
        let config = ClientConfig::default().with_max_manifest_bytes(10 * MAX_MANIFEST_BYTES);
        assert_eq!(config.manifest_limit(), MAX_MANIFEST_BYTES);

        let config = ClientConfig::default().with_max_manifest_bytes(512);
        assert_eq!(config.manifest_limit(), 512);
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"timeout_secs": 12}"#).unwrap();
        assert_eq!(config.timeout_secs, 12);
        assert_eq!(config.discovery_timeout_secs, 10);
        assert_eq!(config.max_manifest_bytes, MAX_MANIFEST_BYTES);
        assert_eq!(config.replay_window_secs, DEFAULT_MAX_AGE_SECS);
        assert_eq!(
            ClientConfig::default().replay_window_secs,
            DEFAULT_MAX_AGE_SECS
        );
    }
}
