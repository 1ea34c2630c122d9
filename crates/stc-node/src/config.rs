//! Node configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stc_directory::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This device's identifier in the directory.
    pub device_id: String,
    /// The peer whose telemetry stream this node talks to.
    pub peer_id: String,

    /// Registration gateway base URL.
    pub gateway_url: String,
    /// Pub/sub broker base URL.
    pub broker_url: String,
    /// Topic namespace; topics are `<namespace>/data/<deviceID>`.
    pub topic_namespace: String,

    /// Persistent key file, one per role instance.
    pub key_file: PathBuf,
    /// Metrics CSV file; absent means metrics are disabled.
    pub metrics_file: Option<PathBuf>,

    /// Seconds between publish ticks.
    pub publish_interval_secs: u64,

    // Startup retry budgets
    pub register_max_attempts: u32,
    pub register_backoff_ms: u64,
    /// Default 1: a missing peer is fatal unless the deployment opts
    /// into waiting for late registration.
    pub lookup_max_attempts: u32,
    pub lookup_backoff_ms: u64,

    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: "UAV-Alpha-7".to_string(),
            peer_id: "GCS-Bravo-3".to_string(),
            gateway_url: "http://localhost:3000".to_string(),
            broker_url: "http://localhost:1884".to_string(),
            topic_namespace: "uav".to_string(),
            key_file: PathBuf::from("device-keys.json"),
            metrics_file: None,
            publish_interval_secs: 5,
            register_max_attempts: 3,
            register_backoff_ms: 500,
            lookup_max_attempts: 1,
            lookup_backoff_ms: 500,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(e.to_string()))?;

        let config: NodeConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("STC_DEVICE_ID") {
            config.device_id = id;
        }
        if let Ok(id) = std::env::var("STC_PEER_ID") {
            config.peer_id = id;
        }
        if let Ok(url) = std::env::var("STC_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(url) = std::env::var("STC_BROKER_URL") {
            config.broker_url = url;
        }
        if let Ok(path) = std::env::var("STC_KEY_FILE") {
            config.key_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("STC_METRICS_FILE") {
            config.metrics_file = Some(PathBuf::from(path));
        }
        if let Ok(secs) = std::env::var("STC_PUBLISH_INTERVAL_SECS") {
            if let Ok(val) = secs.parse::<u64>() {
                config.publish_interval_secs = val;
            }
        }
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.is_empty() {
            return Err(ConfigError::ValidationError("device_id must not be empty".to_string()));
        }
        if self.peer_id.is_empty() {
            return Err(ConfigError::ValidationError("peer_id must not be empty".to_string()));
        }
        if self.device_id == self.peer_id {
            return Err(ConfigError::ValidationError(
                "device_id and peer_id must differ".to_string(),
            ));
        }
        if self.publish_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "publish_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.register_max_attempts == 0 || self.lookup_max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry attempt budgets must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn register_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.register_max_attempts,
            initial_backoff: Duration::from_millis(self.register_backoff_ms),
        }
    }

    pub fn lookup_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.lookup_max_attempts,
            initial_backoff: Duration::from_millis(self.lookup_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_same_device_and_peer_rejected() {
        let config = NodeConfig {
            device_id: "D1".to_string(),
            peer_id: "D1".to_string(),
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = NodeConfig { publish_interval_secs: 0, ..NodeConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = NodeConfig::default();
        let encoded = toml::to_string(&config).unwrap();
        let decoded: NodeConfig = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.device_id, config.device_id);
        assert_eq!(decoded.publish_interval_secs, config.publish_interval_secs);
    }
}
