//! Wireless button switch.
//!
//! Pressed buttons are momentary triggers: a press is remembered until the
//! rule it fired clears it, so holding state never re-fires a rule.

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use glowhub_domain::value::Value;
use parking_lot::Mutex;
use tracing::debug;

use super::parse_state;

pub const BUTTON: &str = "button";
pub const BRIGHTNESS: &str = "brightness";

#[derive(Debug, Default)]
struct Pressed {
    button: Option<&'static str>,
    brightness: Option<&'static str>,
}

pub struct Switch {
    core: DeviceCore,
    pressed: Mutex<Pressed>,
}

impl Switch {
    /// Switches are hidden unless configured otherwise; they have nothing to
    /// show besides what they trigger.
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut info = DeviceInfo::from_config(config).with_triggers([BUTTON, BRIGHTNESS]);
        info.hidden = true;
        Self {
            core: DeviceCore::new(info),
            pressed: Mutex::new(Pressed::default()),
        }
    }
}

impl Device for Switch {
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
        let Some(action) = state.get("action").and_then(serde_json::Value::as_str) else {
            return;
        };
        debug!(device = %self.name(), action, "button pressed");
        let notify = {
            let mut pressed = self.pressed.lock();
            match action {
                "on" => {
                    pressed.button = Some("on");
                    Some((BUTTON, "on"))
                }
                "off" => {
                    pressed.button = Some("off");
                    Some((BUTTON, "off"))
                }
                "brightness_move_up" => {
                    pressed.brightness = Some("up");
                    Some((BRIGHTNESS, "up"))
                }
                "brightness_move_down" => {
                    pressed.brightness = Some("down");
                    Some((BRIGHTNESS, "down"))
                }
                "brightness_stop" => {
                    pressed.brightness = None;
                    None
                }
                _ => None,
            }
        };
        if let Some((key, value)) = notify {
            self.core.notify(key, Value::from(value));
        }
    }

    fn trigger_value(&self, key: &str) -> Option<Value> {
        let pressed = self.pressed.lock();
        match key {
            BUTTON => pressed.button.map(Value::from),
            BRIGHTNESS => pressed.brightness.map(Value::from),
            _ => self.core.trigger_value(key),
        }
    }

    fn clear_trigger(&self, key: &str) {
        if key == BUTTON {
            self.pressed.lock().button = None;
        }
    }
}
