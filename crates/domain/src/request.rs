//! `SwitchRequest`: the command envelope flowing through the command queue.
//!
//! The value is kept as a string so each device can interpret it in its own
//! domain: an absolute number, a relative `+N`/`-N` step, or a verbatim
//! token such as `on` or `toggle`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Key addressed when a request does not name one.
pub const DEFAULT_KEY: &str = "value";

pub(crate) fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

/// A command for one or more devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRequest {
    /// One device name, or a comma separated list for fan-out.
    pub device: String,
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(deserialize_with = "deserialize_loose_string")]
    pub value: String,
    /// Seconds over which a dimmable device should reach the value.
    #[serde(default)]
    pub duration: u64,
}

impl SwitchRequest {
    #[must_use]
    pub fn new(device: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            key: default_key(),
            value: value.into(),
            duration: 0,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration = seconds;
        self
    }

    /// Device names addressed by this request, blanks removed.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.device
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Whether the request addresses the default `value` key.
    #[must_use]
    pub fn is_value_key(&self) -> bool {
        self.key == DEFAULT_KEY
    }

    /// Interpret the value string.
    #[must_use]
    pub fn parsed_value(&self) -> ParsedValue {
        ParsedValue::parse(&self.value)
    }
}

impl fmt::Display for SwitchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} = {}", self.device, self.key, self.value)?;
        if self.duration > 0 {
            write!(f, " over {}s", self.duration)?;
        }
        Ok(())
    }
}

/// Request value after interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Absolute(f64),
    /// Signed offset, from a leading `+` or `-`.
    Relative(f64),
    /// Anything that is not a number, lower-cased.
    Token(String),
}

impl ParsedValue {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let number = raw.parse::<f64>().ok().filter(|v| v.is_finite());
        match (raw.chars().next(), number) {
            (Some('+' | '-'), Some(offset)) => Self::Relative(offset),
            (_, Some(value)) => Self::Absolute(value),
            _ => Self::Token(raw.to_ascii_lowercase()),
        }
    }
}

/// A request value a device could not make sense of.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("device `{device}` cannot use value `{value}` for `{key}`")]
pub struct ParseValueError {
    pub device: String,
    pub key: String,
    pub value: String,
}

impl ParseValueError {
    #[must_use]
    pub fn new(device: &str, request: &SwitchRequest) -> Self {
        Self {
            device: device.to_string(),
            key: request.key.clone(),
            value: request.value.clone(),
        }
    }
}

/// Accept `"50"`, `50`, `50.5` or `true` for a string field.
pub fn deserialize_loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Loose::deserialize(deserializer)? {
        Loose::Text(text) => text,
        Loose::Int(value) => value.to_string(),
        Loose::Float(value) => value.to_string(),
        Loose::Bool(value) => value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_split_targets_when_device_is_a_list() {
        let request = SwitchRequest::new("kitchen, hall,,desk ", "50");
        let targets: Vec<_> = request.targets().collect();
        assert_eq!(targets, vec!["kitchen", "hall", "desk"]);
    }

    #[test]
    fn should_parse_relative_values_when_signed() {
        assert_eq!(ParsedValue::parse("+10"), ParsedValue::Relative(10.0));
        assert_eq!(ParsedValue::parse("-2.5"), ParsedValue::Relative(-2.5));
        assert_eq!(ParsedValue::parse("40"), ParsedValue::Absolute(40.0));
    }

    #[test]
    fn should_keep_tokens_lowercase_when_not_numeric() {
        assert_eq!(ParsedValue::parse(" On "), ParsedValue::Token("on".into()));
        assert_eq!(ParsedValue::parse("NaN"), ParsedValue::Token("nan".into()));
    }

    #[test]
    fn should_default_key_and_duration_when_missing() {
        let request: SwitchRequest =
            serde_json::from_value(serde_json::json!({"device": "desk", "value": 80})).unwrap();
        assert_eq!(request.key, DEFAULT_KEY);
        assert_eq!(request.value, "80");
        assert_eq!(request.duration, 0);
    }

    #[test]
    fn should_accept_bool_value_when_deserializing() {
        let request: SwitchRequest = serde_json::from_value(
            serde_json::json!({"device": "fan", "key": "state", "value": true, "duration": 3}),
        )
        .unwrap();
        assert_eq!(request.value, "true");
        assert_eq!(request.duration, 3);
    }

    #[test]
    fn should_display_duration_when_set() {
        let request = SwitchRequest::new("desk", "80").with_duration(10);
        assert_eq!(request.to_string(), "desk.value = 80 over 10s");
    }
}
