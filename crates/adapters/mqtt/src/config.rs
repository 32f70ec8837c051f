//! MQTT broker connection settings.

use std::time::Duration;

use serde::Deserialize;

use crate::error::MqttError;

/// Configuration of the `[mqtt]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Without a broker, commands are only logged.
    pub enabled: bool,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Outgoing requests buffered before publishing fails.
    pub request_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "glowhub".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            request_capacity: 100,
        }
    }
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    /// # Errors
    ///
    /// Returns [`MqttError::InvalidConfig`] when enabled without a usable
    /// broker address or client id.
    pub fn validate(&self) -> Result<(), MqttError> {
        if !self.enabled {
            return Ok(());
        }
        if self.broker_host.trim().is_empty() {
            return Err(MqttError::InvalidConfig("broker_host must not be empty"));
        }
        if self.broker_port == 0 {
            return Err(MqttError::InvalidConfig("broker_port must not be 0"));
        }
        if self.client_id.trim().is_empty() {
            return Err(MqttError::InvalidConfig("client_id must not be empty"));
        }
        if self.keep_alive_secs < 5 {
            return Err(MqttError::InvalidConfig("keep_alive_secs must be at least 5"));
        }
        Ok(())
    }
}
