//! Probe configuration

use channelsocket::SocketConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// `channel_probe` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Websocket endpoint (ws:// or wss://)
    pub url: String,
    /// Query parameters sent with the handshake (e.g. `vsn`, `token`)
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Topics joined after connecting
    #[serde(default)]
    pub topics: Vec<String>,
    /// Events logged on every joined topic
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Close the connection when heartbeats go unanswered this long
    #[serde(default)]
    pub heartbeat_timeout_secs: Option<u64>,
    #[serde(default = "default_push_timeout")]
    pub push_timeout_secs: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: Option<usize>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_push_timeout() -> u64 {
    10
}

fn default_reconnect_max_attempts() -> Option<usize> {
    Some(10)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ProbeConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        Self::from_yaml(&yaml_content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ProbeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::ValidationError(format!("invalid url '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::ValidationError(
                "url must use the ws or wss scheme".to_string(),
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Timing settings for the socket
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            heartbeat_timeout: self.heartbeat_timeout_secs.map(Duration::from_secs),
            push_timeout: Some(Duration::from_secs(self.push_timeout_secs)),
            ..SocketConfig::default()
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  URL: {}", self.url);
        info!("  Params: {}", self.params.keys().cloned().collect::<Vec<_>>().join(", "));
        info!("  Topics: {}", self.topics.join(", "));
        info!("  Events: {}", self.events.join(", "));
        info!("  Heartbeat interval: {}s", self.heartbeat_interval_secs);
        if let Some(timeout) = self.heartbeat_timeout_secs {
            info!("  Heartbeat timeout: {}s", timeout);
        }
        info!("  Push timeout: {}s", self.push_timeout_secs);
        info!("  Log level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ProbeConfig::from_yaml("url: ws://localhost:4000/socket/websocket\n").unwrap();

        assert!(config.topics.is_empty());
        assert_eq!(config.heartbeat_interval_secs, 30);
        assert_eq!(config.heartbeat_timeout_secs, None);
        assert_eq!(config.push_timeout_secs, 10);
        assert_eq!(config.reconnect_max_attempts, Some(10));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_socket_config_conversion() {
        let yaml = "url: wss://chat.example.com/socket/websocket\nheartbeat_interval_secs: 5\nheartbeat_timeout_secs: 12\n";
        let socket = ProbeConfig::from_yaml(yaml).unwrap().socket_config();

        assert_eq!(socket.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(socket.heartbeat_timeout, Some(Duration::from_secs(12)));
        assert_eq!(socket.push_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ProbeConfig::from_yaml("url: http://localhost\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            ProbeConfig::from_yaml("url: ws://localhost\nlog_level: loud\n"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            ProbeConfig::from_yaml("topics: [a]\n"),
            Err(ConfigError::YamlError(_))
        ));
    }
}
