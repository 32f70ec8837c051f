//! Hysteresis thermostat switching a heater.

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::error::ValidationError;
use glowhub_domain::request::{ParseValueError, ParsedValue, SwitchRequest};
use glowhub_domain::time::Timestamp;
use parking_lot::Mutex;
use tracing::info;

use super::parse_state;

pub const DEFAULT_SETPOINT: f64 = 18.0;
pub const DEFAULT_MARGIN: f64 = 0.5;
const DEFAULT_FIELD: &str = "temperature";

/// Value is the measured temperature, target the set point.
///
/// When the temperature drops below `setpoint - margin / 2` the target
/// device is switched on; above `setpoint + margin / 2` it is switched off.
/// A request is only issued when the heating state changes.
pub struct Thermostat {
    core: DeviceCore,
    target: String,
    margin: f64,
    field: String,
    heating: Mutex<Option<bool>>,
}

impl Thermostat {
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingOption`] without a `target` option.
    pub fn from_config(config: &DeviceConfig) -> Result<Self, ValidationError> {
        let options = &config.options;
        let target = config.require("target", options.target.as_ref())?.to_string();
        let core = DeviceCore::new(DeviceInfo::from_config(config).with_receivers(["value"]));
        let setpoint = options.setpoint.unwrap_or(DEFAULT_SETPOINT);
        core.write(|state| state.transition.target = Some(setpoint));
        Ok(Self {
            core,
            target,
            margin: options.margin.unwrap_or(DEFAULT_MARGIN),
            field: options
                .sensor
                .clone()
                .unwrap_or_else(|| DEFAULT_FIELD.to_string()),
            heating: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn setpoint(&self) -> f64 {
        self.core
            .read(|state| state.transition.target)
            .unwrap_or(DEFAULT_SETPOINT)
    }

    /// Heating state last requested from the target, `None` before the
    /// first decision.
    #[must_use]
    pub fn heating(&self) -> Option<bool> {
        *self.heating.lock()
    }

    /// Temperature carried by a bare number or a JSON object payload.
    fn reading(&self, payload: &[u8]) -> Option<f64> {
        if let Some(value) = std::str::from_utf8(payload)
            .ok()
            .and_then(|text| text.trim().parse::<f64>().ok())
        {
            return Some(value);
        }
        let state = parse_state(self.name(), payload)?;
        self.core.record_telemetry(&state);
        state.get(&self.field).and_then(serde_json::Value::as_f64)
    }
}

impl Device for Thermostat {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn max(&self) -> f64 {
        99.0
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        if !request.is_value_key() {
            return Err(ParseValueError::new(self.name(), request));
        }
        let setpoint = match request.parsed_value() {
            ParsedValue::Absolute(value) => value,
            ParsedValue::Relative(offset) => self.setpoint() + offset,
            ParsedValue::Token(_) => return Err(ParseValueError::new(self.name(), request)),
        };
        let setpoint = setpoint.max(self.min()).min(self.max());
        self.core.write(|state| state.transition.target = Some(setpoint));
        info!(device = %self.name(), setpoint, "set point changed");
        Ok(())
    }

    fn handle_state(&self, payload: &[u8]) {
        if let Some(temperature) = self.reading(payload) {
            self.set_current(temperature);
        }
    }

    fn follow_up_request(&self, _now: Timestamp) -> Option<SwitchRequest> {
        self.last_changed()?;
        let temperature = self.current();
        let setpoint = self.setpoint();
        let wanted = if temperature < setpoint - self.margin / 2.0 {
            true
        } else if temperature > setpoint + self.margin / 2.0 {
            false
        } else {
            return None;
        };
        let mut heating = self.heating.lock();
        if *heating == Some(wanted) {
            return None;
        }
        *heating = Some(wanted);
        info!(device = %self.name(), temperature, setpoint, heating = wanted, "heating changed");
        Some(SwitchRequest::new(&self.target, if wanted { "on" } else { "off" }))
    }
}
