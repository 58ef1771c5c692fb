//! Configuration loading and management.

use crate::feed::Provider;
use crate::stream::Endpoint;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Collector configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Streaming connection settings.
    pub stream: StreamConfig,
    /// Collection settings.
    #[serde(default)]
    pub collect: CollectConfig,
}

/// Streaming connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Provider hostname (e.g. "api.tiingo.com").
    pub host: String,
    /// Provider port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Resource path for the upgrade handshake (e.g. "/iex").
    #[serde(default = "default_path")]
    pub path: String,
    /// Whether the transport is TLS-wrapped.
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Provider API key, sent inside subscribe frames.
    pub api_key: Option<String>,
    /// Deadline covering the whole resolve-through-upgrade chain.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-read deadline once connected.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

/// Collection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectConfig {
    /// Tickers to subscribe to.
    #[serde(default)]
    pub tickers: Vec<String>,
    /// Provider dialect for subscribe frames.
    #[serde(default)]
    pub provider: Provider,
    /// Stop collecting after this many seconds, if set.
    pub max_runtime_secs: Option<u64>,
}

fn default_port() -> u16 {
    443
}

fn default_path() -> String {
    "/".to_string()
}

fn default_tls() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    30
}

impl StreamConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            path: self.path.clone(),
            tls: self.tls,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
