//! Configuration loading: TOML file with environment variable overrides.
//!
//! Reads `glowhub.toml` from the working directory, or the file named by
//! `GLOWHUB_CONFIG`. Every section has defaults, but the file itself is
//! required: without it there are no devices to control. Environment
//! variables take precedence over file values.

use std::time::Duration;

use glowhub_adapter_mqtt::{MqttConfig, MqttError};
use glowhub_app::runtime::RuntimeConfig;
use glowhub_domain::config::{DeviceConfig, RuleConfig};
use serde::Deserialize;

/// Config file read when `GLOWHUB_CONFIG` is unset.
pub const DEFAULT_PATH: &str = "glowhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    pub mqtt: MqttConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Control loop tunables.
    pub runtime: RuntimeSettings,
    pub devices: Vec<DeviceConfig>,
    pub rules: Vec<RuleConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// The `[runtime]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Scheduler period in milliseconds.
    pub cycle_length_ms: u64,
    /// Commands buffered before producers wait.
    pub queue_capacity: usize,
}

impl Config {
    /// Load the configuration file then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, malformed or
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GLOWHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::Missing(path.to_string()))
            }
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply overrides read through `var`, later keys winning.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("GLOWHUB_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("GLOWHUB_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("GLOWHUB_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("GLOWHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(val) = var("GLOWHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.runtime.cycle_length_ms == 0 {
            return Err(ConfigError::Validation(
                "cycle_length_ms must be non-zero".to_string(),
            ));
        }
        if self.runtime.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "queue_capacity must be non-zero".to_string(),
            ));
        }
        self.mqtt.validate()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl RuntimeSettings {
    #[must_use]
    pub fn cycle_length(&self) -> Duration {
        Duration::from_millis(self.cycle_length_ms)
    }

    #[must_use]
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            cycle_length: self.cycle_length(),
            queue_capacity: self.queue_capacity,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "glowhubd=info,glowhub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            cycle_length_ms: u64::try_from(defaults.cycle_length.as_millis()).unwrap_or(200),
            queue_capacity: defaults.queue_capacity,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file `{0}` not found")]
    Missing(String),
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("invalid mqtt settings")]
    Mqtt(#[from] MqttError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
