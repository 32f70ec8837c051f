//! On/off smart plug.

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_app::ports::{Transport, TransportError};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, ParsedValue, SwitchRequest};
use serde::Serialize;

use super::{STATE_OFF, STATE_ON, encode, get_topic, parse_state, set_topic};

#[derive(Debug, Serialize)]
struct PlugCommand {
    state: &'static str,
}

/// A plug is either off (0) or on (1). Requests set the target; the next
/// tick applies it and publishes the new state.
pub struct Plug {
    core: DeviceCore,
}

impl Plug {
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        let info = DeviceInfo::from_config(config).with_receivers(["value"]);
        Self {
            core: DeviceCore::new(info),
        }
    }

    #[must_use]
    pub fn is_on(&self) -> bool {
        self.current() > 0.0
    }

    fn resolve(&self, request: &SwitchRequest) -> Result<f64, ParseValueError> {
        match request.parsed_value() {
            ParsedValue::Absolute(value) => Ok(if value > 0.0 { 1.0 } else { 0.0 }),
            ParsedValue::Token(token) if token == "on" => Ok(1.0),
            ParsedValue::Token(token) if token == "off" => Ok(0.0),
            ParsedValue::Token(token) if token == "toggle" => {
                let pending = self.core.read(|state| state.transition.target);
                let on = pending.map_or_else(|| self.is_on(), |target| target > 0.0);
                Ok(if on { 0.0 } else { 1.0 })
            }
            ParsedValue::Relative(_) | ParsedValue::Token(_) => {
                Err(ParseValueError::new(self.name(), request))
            }
        }
    }
}

impl Device for Plug {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        if !request.is_value_key() {
            return Err(ParseValueError::new(self.name(), request));
        }
        let target = self.resolve(request)?;
        self.core.write(|state| state.transition.target = Some(target));
        Ok(())
    }

    #[allow(clippy::float_cmp)]
    fn update_value(&self, tick: u64) -> Option<f64> {
        self.core.once_per_tick(tick, || {
            let target = self
                .core
                .read(|state| state.transition.target.filter(|t| *t != state.current))?;
            self.set_current(target);
            Some(target)
        })
    }

    fn publish_value(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        let topic = &self.core.info().topic;
        if topic.is_empty() {
            return Ok(());
        }
        let command = PlugCommand {
            state: if self.is_on() { STATE_ON } else { STATE_OFF },
        };
        let topic = set_topic(topic);
        let payload = encode(&topic, &command)?;
        transport.publish(&topic, payload)
    }

    fn poll_value(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        let Some(state_topic) = self.state_topic() else {
            return Ok(());
        };
        let topic = get_topic(state_topic);
        let payload = encode(&topic, &serde_json::json!({ "state": "" }))?;
        transport.publish(&topic, payload)
    }

    #[allow(clippy::float_cmp)]
    fn handle_state(&self, payload: &[u8]) {
        let Some(state) = parse_state(self.name(), payload) else {
            return;
        };
        self.core.record_telemetry(&state);
        let value = match state.get("state").and_then(serde_json::Value::as_str) {
            Some(s) if s.eq_ignore_ascii_case(STATE_ON) => 1.0,
            Some(s) if s.eq_ignore_ascii_case(STATE_OFF) => 0.0,
            _ => return,
        };
        let changed = self.core.write(|state| {
            state.transition.target = Some(value);
            state.current != value
        });
        if changed {
            self.set_current(value);
        }
    }
}
