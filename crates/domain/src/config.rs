//! Configuration records for devices and rules.
//!
//! These are plain data, deserialized from the daemon's TOML file. Turning
//! them into live devices and rules is done by the `app` crate and the
//! device adapter, which also resolve device names.

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::ValidationError;

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Driver name: `light`, `plug`, `switch`, `sensor`, `motion_sensor`,
    /// `thermostat` or `group`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub label: String,
    /// Base transport topic of the physical device.
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub options: DeviceOptions,
}

impl DeviceConfig {
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            label: String::new(),
            topic: String::new(),
            hidden: false,
            options: DeviceOptions::default(),
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DeviceOptions) -> Self {
        self.options = options;
        self
    }

    /// Label shown to users, falling back to the name.
    #[must_use]
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }

    /// Check the fields every driver relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the name is blank or the bounds are
    /// inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if let (Some(min), Some(max)) = (self.options.min, self.options.max)
            && min > max
        {
            return Err(ValidationError::InvertedBounds {
                device: self.name.clone(),
                min,
                max,
            });
        }
        Ok(())
    }

    /// Fetch a required string option.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingOption`] when the option is absent.
    pub fn require<'a>(
        &self,
        option: &'static str,
        value: Option<&'a String>,
    ) -> Result<&'a str, ValidationError> {
        value
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ValidationError::MissingOption {
                device: self.name.clone(),
                option,
            })
    }
}

/// Driver specific options. Each driver reads the ones it understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Let the physical light animate transitions itself.
    pub transition: bool,
    /// Group members.
    pub devices: Vec<String>,
    /// Sensor payload fields exposed as triggers.
    pub fields: Vec<String>,
    /// Device switched by a motion sensor or thermostat.
    pub target: Option<String>,
    /// Seconds without motion before the target is switched off.
    pub timeout: Option<u64>,
    /// Transition seconds used when a motion sensor switches its target.
    pub target_on_duration: Option<u64>,
    pub target_off_duration: Option<u64>,
    /// Thermostat hysteresis in degrees.
    pub margin: Option<f64>,
    /// Initial thermostat set point.
    pub setpoint: Option<f64>,
    /// Payload field a thermostat reads its temperature from, `temperature`
    /// when unset.
    pub sensor: Option<String>,
    /// Overrides the topic inbound state is read from.
    pub state_topic: Option<String>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,
    #[serde(default)]
    pub single_use: bool,
}

impl RuleConfig {
    /// # Errors
    ///
    /// Returns [`ValidationError::NoReceivers`] when the rule can never do
    /// anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.receivers.is_empty() {
            return Err(ValidationError::NoReceivers);
        }
        Ok(())
    }

    /// Triggers that take part in evaluation.
    pub fn active_triggers(&self) -> impl Iterator<Item = &TriggerConfig> {
        self.triggers.iter().filter(|trigger| trigger.active)
    }
}

fn default_active() -> bool {
    true
}

/// Watch clause of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub device: String,
    pub key: String,
    /// Inactive triggers are kept in the file but ignored.
    #[serde(default = "default_active")]
    pub active: bool,
    pub condition: Condition,
}

impl TriggerConfig {
    #[must_use]
    pub fn new(device: impl Into<String>, key: impl Into<String>, condition: Condition) -> Self {
        Self {
            device: device.into(),
            key: key.into(),
            active: true,
            condition,
        }
    }
}

/// Action clause of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub device: String,
    #[serde(default = "crate::request::default_key")]
    pub key: String,
    #[serde(deserialize_with = "crate::request::deserialize_loose_string")]
    pub value: String,
}

impl ReceiverConfig {
    #[must_use]
    pub fn new(
        device: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use crate::value::Value;

    const SAMPLE: &str = r#"
        [[devices]]
        type = "light"
        name = "desk"
        topic = "zigbee2mqtt/desk"

        [devices.options]
        max = 254
        transition = true

        [[devices]]
        type = "group"
        name = "living"
        label = "Living room"

        [devices.options]
        devices = ["desk", "couch"]

        [[rules]]
        name = "evening"

        [[rules.triggers]]
        device = "time"
        key = "hour"
        condition = { operator = "=", value = 19 }

        [[rules.triggers]]
        device = "hall"
        key = "occupancy"
        active = false
        condition = { operator = "==", value = true, delay = 30 }

        [[rules.receivers]]
        device = "living"
        value = 80

        [[rules.receivers]]
        device = "living"
        key = "duration"
        value = "10"
    "#;

    #[derive(Deserialize)]
    struct Sample {
        devices: Vec<DeviceConfig>,
        rules: Vec<RuleConfig>,
    }

    #[test]
    fn should_parse_devices_and_rules_from_toml() {
        let sample: Sample = toml::from_str(SAMPLE).unwrap();

        let desk = &sample.devices[0];
        assert_eq!(desk.kind, "light");
        assert_eq!(desk.options.max, Some(254.0));
        assert!(desk.options.transition);
        assert_eq!(desk.display_label(), "desk");

        let group = &sample.devices[1];
        assert_eq!(group.options.devices, vec!["desk", "couch"]);
        assert_eq!(group.display_label(), "Living room");

        let rule = &sample.rules[0];
        assert_eq!(rule.triggers[0].condition.operator, Operator::Eq);
        assert_eq!(rule.triggers[0].condition.value, Value::Int(19));
        assert_eq!(rule.triggers[1].condition.delay, Some(30));
        assert_eq!(rule.receivers[0].key, "value");
        assert_eq!(rule.receivers[0].value, "80");
        assert!(!rule.single_use);
    }

    #[test]
    fn should_skip_inactive_triggers() {
        let sample: Sample = toml::from_str(SAMPLE).unwrap();
        let active: Vec<_> = sample.rules[0].active_triggers().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, "hour");
    }

    #[test]
    fn should_reject_inverted_bounds() {
        let config = DeviceConfig::new("light", "desk").with_options(DeviceOptions {
            min: Some(10.0),
            max: Some(5.0),
            ..DeviceOptions::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvertedBounds { .. })
        ));
    }

    #[test]
    fn should_reject_blank_name() {
        assert_eq!(
            DeviceConfig::new("plug", "  ").validate(),
            Err(ValidationError::EmptyName)
        );
    }

    #[test]
    fn should_report_missing_option_when_required() {
        let config = DeviceConfig::new("thermostat", "heating");
        let err = config.require("target", config.options.target.as_ref()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingOption {
                device: "heating".to_string(),
                option: "target"
            }
        );
    }

    #[test]
    fn should_reject_rule_without_receivers() {
        assert_eq!(
            RuleConfig::default().validate(),
            Err(ValidationError::NoReceivers)
        );
    }
}
