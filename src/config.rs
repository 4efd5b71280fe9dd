//! Client configuration for MiniMQ producers and consumers
//!
//! Configuration is read from TOML. Every field has a default, so an empty
//! file (or no file at all) yields a client pointed at `localhost:5677` with
//! the standard poll-loop policy.

use crate::transport::BrokerAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Broker port used by both producer and consumer unless configured
pub const DEFAULT_PORT: u16 = 5677;

/// Main client configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub consumer: ConsumerSection,
}

/// Broker section - where to connect and how long to wait
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Host name, IP address, or a full `tcp://host:port` URL
    #[serde(default = "default_host")]
    pub host: String,
    /// Port used when `host` is not a URL carrying its own port
    #[serde(default = "default_port")]
    pub port: u16,
    /// TCP connect timeout in milliseconds (default: 5000)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Consumer section - poll loop policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerSection {
    /// Delay before retrying a failed connect (default: 5000)
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    /// Delay after a `NO_MSG` reply before polling again (default: 1000)
    #[serde(default = "default_empty_poll_backoff_ms")]
    pub empty_poll_backoff_ms: u64,
    /// How long `stop()` waits for each listener to exit (default: 2000)
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            connect_backoff_ms: default_connect_backoff_ms(),
            empty_poll_backoff_ms: default_empty_poll_backoff_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_connect_backoff_ms() -> u64 {
    5000
}

fn default_empty_poll_backoff_ms() -> u64 {
    1000
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid port value in {var}: {value}")]
    InvalidPort { var: String, value: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file, then validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a specific broker, all other fields defaulted
    pub fn for_broker(host: impl Into<String>, port: u16) -> Self {
        Self {
            broker: BrokerSection {
                host: host.into(),
                port,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Apply `MINIMQ_HOST` / `MINIMQ_PORT` overrides from the environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("MINIMQ_HOST") {
            self.broker.host = host;
        }
        if let Ok(port) = std::env::var("MINIMQ_PORT") {
            self.broker.port = port.trim().parse().map_err(|_| ConfigError::InvalidPort {
                var: "MINIMQ_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        Ok(())
    }

    /// Check value ranges that TOML typing cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.address()?;

        if self.broker.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let consumer = &self.consumer;
        for (name, value) in [
            ("consumer.connect_backoff_ms", consumer.connect_backoff_ms),
            ("consumer.empty_poll_backoff_ms", consumer.empty_poll_backoff_ms),
            ("consumer.shutdown_timeout_ms", consumer.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        Ok(())
    }
}

impl BrokerSection {
    /// Resolve the broker address.
    ///
    /// A `host` that parses as a URL with both host and port wins; anything
    /// else is treated as a bare host name combined with `port`.
    pub fn address(&self) -> Result<BrokerAddress, ConfigError> {
        if let Some(address) = parse_broker_url(&self.host) {
            return Ok(address);
        }

        let host = self.host.trim();
        if host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must be greater than 0".to_string(),
            ));
        }

        Ok(BrokerAddress::new(host, self.port))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ConsumerSection {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn empty_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_poll_backoff_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Parse `scheme://host:port`; `None` when either part is missing
fn parse_broker_url(value: &str) -> Option<BrokerAddress> {
    let url = Url::parse(value).ok()?;
    let host = url.host_str()?;
    let port = url.port()?;
    Some(BrokerAddress::new(host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 5677);
        assert_eq!(config.consumer.connect_backoff(), Duration::from_secs(5));
        assert_eq!(config.consumer.empty_poll_backoff(), Duration::from_secs(1));
        assert_eq!(config.consumer.shutdown_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[broker]
host = "mq.internal"
port = 9999
connect_timeout_ms = 750

[consumer]
connect_backoff_ms = 250
empty_poll_backoff_ms = 50
shutdown_timeout_ms = 500
"#;

        let config: ClientConfig = toml::from_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.broker.address().unwrap(),
            BrokerAddress::new("mq.internal", 9999)
        );
        assert_eq!(config.broker.connect_timeout(), Duration::from_millis(750));
        assert_eq!(config.consumer.connect_backoff_ms, 250);
        assert_eq!(config.consumer.empty_poll_backoff_ms, 50);
        assert_eq!(config.consumer.shutdown_timeout_ms, 500);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: ClientConfig = toml::from_str("[consumer]\nempty_poll_backoff_ms = 10\n").unwrap();
        assert_eq!(config.consumer.empty_poll_backoff_ms, 10);
        assert_eq!(config.consumer.connect_backoff_ms, 5000);
        assert_eq!(config.broker, BrokerSection::default());
    }

    #[test]
    fn test_url_host_overrides_port() {
        let section = BrokerSection {
            host: "tcp://10.0.0.5:7000".to_string(),
            port: 5677,
            ..Default::default()
        };
        assert_eq!(
            section.address().unwrap(),
            BrokerAddress::new("10.0.0.5", 7000)
        );
    }

    #[test]
    fn test_url_without_port_falls_back_to_plain_host() {
        // A bare host like "localhost" is not a URL; "broker.local" is not either
        for host in ["localhost", "broker.local", "127.0.0.1"] {
            let section = BrokerSection {
                host: host.to_string(),
                port: 6000,
                ..Default::default()
            };
            assert_eq!(section.address().unwrap(), BrokerAddress::new(host, 6000));
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ClientConfig::default();
        config.broker.host = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));

        let mut config = ClientConfig::default();
        config.broker.port = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.consumer.empty_poll_backoff_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("empty_poll_backoff_ms"));

        let mut config = ClientConfig::default();
        config.broker.connect_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_for_broker() {
        let config = ClientConfig::for_broker("127.0.0.1", 4000);
        assert_eq!(
            config.broker.address().unwrap(),
            BrokerAddress::new("127.0.0.1", 4000)
        );
        assert_eq!(config.consumer, ConsumerSection::default());
    }

    #[test]
    fn test_unknown_types_fail_to_parse() {
        let result: Result<ClientConfig, _> = toml::from_str("[broker]\nport = \"not-a-number\"\n");
        assert!(result.is_err());
    }
}
