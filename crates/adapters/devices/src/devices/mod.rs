//! Concrete device drivers.
//!
//! Every driver embeds a [`DeviceCore`](glowhub_app::device::DeviceCore)
//! (directly or through a [`Dimmable`](glowhub_app::dimmable::Dimmable)) and
//! speaks the zigbee2mqtt JSON dialect on its topics.

mod light;
mod motion_sensor;
mod plug;
mod sensor;
mod switch;
mod thermostat;

pub use light::Light;
pub use motion_sensor::MotionSensor;
pub use plug::Plug;
pub use sensor::Sensor;
pub use switch::Switch;
pub use thermostat::Thermostat;

use glowhub_app::ports::TransportError;
use serde::Serialize;
use tracing::warn;

/// Zigbee2mqtt `state` values.
pub(crate) const STATE_ON: &str = "ON";
pub(crate) const STATE_OFF: &str = "OFF";

/// Parse an inbound state payload, logging and dropping malformed ones.
pub(crate) fn parse_state(device: &str, payload: &[u8]) -> Option<serde_json::Value> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(device, error = %err, "malformed state payload ignored");
            None
        }
    }
}

/// Serialize `message` for `topic`.
pub(crate) fn encode<T: Serialize>(topic: &str, message: &T) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|err| TransportError::Publish {
        topic: topic.to_string(),
        source: Box::new(err),
    })
}

/// `{topic}/set`, where devices accept commands.
pub(crate) fn set_topic(topic: &str) -> String {
    format!("{topic}/set")
}

/// `{topic}/get`, where devices are asked to report their state.
pub(crate) fn get_topic(topic: &str) -> String {
    format!("{topic}/get")
}
