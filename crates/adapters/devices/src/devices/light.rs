//! Dimmable zigbee light.

use std::time::Duration;

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_app::dimmable::Dimmable;
use glowhub_app::ports::{Transport, TransportError};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use serde::Serialize;
use tracing::debug;

use super::{STATE_OFF, STATE_ON, encode, get_topic, parse_state, set_topic};

const DEFAULT_RAW_MIN: f64 = 0.0;
const DEFAULT_RAW_MAX: f64 = 254.0;

#[derive(Debug, Serialize)]
struct LightCommand {
    state: &'static str,
    brightness: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    transition: Option<u64>,
}

/// A light whose value is a brightness percentage.
///
/// The `min` and `max` options bound the raw brightness the bulb
/// understands (`0..=254` unless configured); the device value itself always
/// moves between 0 and 100.
pub struct Light {
    dimmable: Dimmable,
    raw_min: f64,
    raw_max: f64,
}

impl Light {
    #[must_use]
    pub fn from_config(config: &DeviceConfig, cycle_length: Duration) -> Self {
        let info = DeviceInfo::from_config(config).with_receivers(["value", "duration"]);
        let dimmable = Dimmable::new(info, 0.0, 100.0, cycle_length)
            .with_transition_mode(config.options.transition);
        Self {
            dimmable,
            raw_min: config.options.min.unwrap_or(DEFAULT_RAW_MIN),
            raw_max: config.options.max.unwrap_or(DEFAULT_RAW_MAX),
        }
    }

    /// Raw brightness for a percentage. Anything above 0% and up to 1% maps
    /// to the dimmest level the bulb can show.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_raw(&self, percentage: f64) -> i64 {
        let raw = if percentage <= 1.0 {
            self.raw_min + percentage.round()
        } else {
            self.raw_min
                + 1.0
                + ((self.raw_max - self.raw_min - 1.0) * (percentage - 1.0) / 99.0).trunc()
        };
        raw as i64
    }

    #[must_use]
    pub fn to_percentage(&self, raw: f64) -> f64 {
        if raw <= self.raw_min {
            0.0
        } else if raw <= self.raw_min + 1.0 {
            1.0
        } else if raw >= self.raw_max {
            100.0
        } else {
            1.0 + (raw - self.raw_min - 1.0) * 99.0 / (self.raw_max - self.raw_min - 1.0)
        }
    }

    /// Percentage reported by a state payload: a bare raw brightness, or a
    /// zigbee2mqtt `{state, brightness}` object.
    fn reported(&self, payload: &[u8]) -> Option<f64> {
        if let Some(raw) = std::str::from_utf8(payload)
            .ok()
            .and_then(|text| text.trim().parse::<f64>().ok())
        {
            return Some(self.to_percentage(raw));
        }
        let state = parse_state(self.name(), payload)?;
        self.core().record_telemetry(&state);
        let brightness = state.get("brightness").and_then(serde_json::Value::as_f64);
        match state.get("state").and_then(serde_json::Value::as_str) {
            Some(s) if s.eq_ignore_ascii_case(STATE_OFF) => Some(0.0),
            Some(s) if s.eq_ignore_ascii_case(STATE_ON) => Some(match brightness {
                Some(raw) => self.to_percentage(raw),
                None if self.current() > 0.0 => self.current(),
                None => 100.0,
            }),
            _ => brightness.map(|raw| self.to_percentage(raw)),
        }
    }
}

impl Device for Light {
    fn core(&self) -> &DeviceCore {
        self.dimmable.core()
    }

    fn min(&self) -> f64 {
        self.dimmable.min()
    }

    fn max(&self) -> f64 {
        self.dimmable.max()
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        self.dimmable.process_request(request)
    }

    fn update_value(&self, tick: u64) -> Option<f64> {
        self.dimmable.update_value(tick)
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_value(&self, transport: &dyn Transport) -> Result<(), TransportError> {
        let topic = &self.core().info().topic;
        if topic.is_empty() {
            return Ok(());
        }
        let current = self.current();
        let raw = self.to_raw(current);
        if !self.dimmable.mark_sent(raw as f64) {
            return Ok(());
        }
        let transition = if self.dimmable.transition_mode() {
            self.dimmable.take_transition_time()
        } else {
            None
        };
        let command = LightCommand {
            state: if current > 0.0 { STATE_ON } else { STATE_OFF },
            brightness: raw,
            transition,
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

    #[allow(clippy::cast_precision_loss)]
    fn handle_state(&self, payload: &[u8]) {
        let Some(percentage) = self.reported(payload) else {
            return;
        };
        if self.dimmable.is_moving() {
            debug!(device = %self.name(), percentage, "light is moving, reported state ignored");
            return;
        }
        self.dimmable.sync(percentage);
        self.dimmable.mark_sent(self.to_raw(percentage) as f64);
    }
}
