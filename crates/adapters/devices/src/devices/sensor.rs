//! Generic multi-field sensor.

use std::collections::BTreeMap;

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use glowhub_domain::status::{DeviceStatus, RESERVED_KEYS};
use glowhub_domain::value::Value;
use parking_lot::RwLock;
use tracing::warn;

use super::parse_state;

/// Exposes the configured payload fields (`temperature`, `humidity`, ...)
/// as triggers. Readings show up in the status snapshot under their field
/// name, except fields clashing with a fixed status key such as `battery`,
/// which stay usable as triggers only.
pub struct Sensor {
    core: DeviceCore,
    fields: Vec<String>,
    values: RwLock<BTreeMap<String, Value>>,
}

impl Sensor {
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        let fields = config.options.fields.clone();
        for field in fields.iter().filter(|f| RESERVED_KEYS.contains(&f.as_str())) {
            warn!(device = %config.name, field, "field hidden from status, key is reserved");
        }
        let info = DeviceInfo::from_config(config).with_triggers(fields.iter().cloned());
        Self {
            core: DeviceCore::new(info),
            fields,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<Value> {
        self.values.read().get(field).cloned()
    }

    /// Store a reading and notify rules watching `field`.
    pub fn set_value(&self, field: &str, value: Value) {
        self.values.write().insert(field.to_string(), value.clone());
        self.core.notify(field, value);
    }
}

impl Device for Sensor {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        Err(ParseValueError::new(self.name(), request))
    }

    fn handle_state(&self, payload: &[u8]) {
        let Some(state) = parse_state(self.name(), payload) else {
            return;
        };
        self.core.record_telemetry(&state);
        for field in &self.fields {
            if let Some(value) = state.get(field).and_then(Value::from_json) {
                self.set_value(field, value);
            }
        }
    }

    fn trigger_value(&self, key: &str) -> Option<Value> {
        self.value(key).or_else(|| self.core.trigger_value(key))
    }

    fn status(&self) -> DeviceStatus {
        let mut status = self.core.status(self.min(), self.max());
        for (field, value) in self.values.read().iter() {
            status.insert_extra(field, value.clone());
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use glowhub_domain::config::DeviceOptions;

    use super::*;

    fn sensor() -> Sensor {
        let config = DeviceConfig::new("sensor", "bathroom")
            .with_topic("zigbee2mqtt/bathroom")
            .with_options(DeviceOptions {
                fields: vec!["temperature".to_string(), "humidity".to_string()],
                ..DeviceOptions::default()
            });
        Sensor::from_config(&config)
    }

    #[test]
    fn should_expose_configured_fields_as_triggers() {
        let sensor = sensor();
        assert_eq!(sensor.triggers(), ["temperature", "humidity"]);
        assert_eq!(sensor.fields().len(), 2);
    }

    #[test]
    fn should_record_configured_fields_only() {
        let sensor = sensor();
        sensor.handle_state(br#"{"temperature":21.5,"humidity":60,"pressure":1012,"battery":77}"#);

        assert_eq!(sensor.value("temperature"), Some(Value::Float(21.5)));
        assert_eq!(sensor.trigger_value("humidity"), Some(Value::Int(60)));
        assert_eq!(sensor.value("pressure"), None);

        let status = sensor.status();
        assert_eq!(status.battery, Some(77));
        assert_eq!(status.extra.get("humidity"), Some(&Value::Int(60)));
    }

    #[test]
    fn should_keep_reserved_fields_out_of_status_extras() {
        let config = DeviceConfig::new("sensor", "porch").with_options(DeviceOptions {
            fields: vec!["battery".to_string(), "value".to_string(), "lux".to_string()],
            ..DeviceOptions::default()
        });
        let sensor = Sensor::from_config(&config);
        sensor.handle_state(br#"{"battery":40,"value":7,"lux":300}"#);

        assert_eq!(sensor.trigger_value("value"), Some(Value::Int(7)));
        let status = sensor.status();
        assert_eq!(status.battery, Some(40));
        assert_eq!(status.extra.keys().collect::<Vec<_>>(), ["lux"]);

        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json.matches("\"battery\"").count(), 1);
        assert_eq!(json.matches("\"value\"").count(), 1);
    }

    #[test]
    fn should_ignore_malformed_payload() {
        let sensor = sensor();
        sensor.handle_state(b"not json");
        assert!(sensor.status().extra.is_empty());
    }
}
