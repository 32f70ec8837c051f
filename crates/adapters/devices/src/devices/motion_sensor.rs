//! Occupancy sensor that can drive a target device on its own.

use glowhub_app::device::{Device, DeviceCore, DeviceInfo};
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use glowhub_domain::time::{Timestamp, elapsed_at_least, now};
use parking_lot::Mutex;
use tracing::info;

use super::parse_state;

/// Seconds without motion before the target is switched off.
pub const DEFAULT_TIMEOUT: u64 = 60;

#[derive(Debug, Default)]
struct Occupancy {
    last_motion: Option<Timestamp>,
    /// Whether this sensor switched its target on and still owes the off.
    target_on: bool,
}

/// Value is 1 while occupied, 0 otherwise.
///
/// With a `target` option, motion switches the target on and, once the
/// sensor reports no occupancy and `timeout` seconds have passed since the
/// last motion, off again.
pub struct MotionSensor {
    core: DeviceCore,
    target: Option<String>,
    timeout: u64,
    on_duration: u64,
    off_duration: u64,
    occupancy: Mutex<Occupancy>,
}

impl MotionSensor {
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        let options = &config.options;
        Self {
            core: DeviceCore::new(DeviceInfo::from_config(config)),
            target: options.target.clone().filter(|t| !t.is_empty()),
            timeout: options.timeout.unwrap_or(DEFAULT_TIMEOUT),
            on_duration: options.target_on_duration.unwrap_or(0),
            off_duration: options.target_off_duration.unwrap_or(0),
            occupancy: Mutex::new(Occupancy::default()),
        }
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.current() > 0.0
    }

    #[must_use]
    pub fn last_motion(&self) -> Option<Timestamp> {
        self.occupancy.lock().last_motion
    }
}

impl Device for MotionSensor {
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
        let Some(occupied) = state.get("occupancy").and_then(serde_json::Value::as_bool) else {
            return;
        };
        if occupied {
            self.occupancy.lock().last_motion = Some(now());
        }
        self.set_current(if occupied { 1.0 } else { 0.0 });
    }

    fn follow_up_request(&self, now: Timestamp) -> Option<SwitchRequest> {
        let target = self.target.as_deref()?;
        let occupied = self.is_occupied();
        let mut occupancy = self.occupancy.lock();
        if occupied && !occupancy.target_on {
            occupancy.target_on = true;
            info!(device = %self.name(), target, "motion detected, switching target on");
            return Some(SwitchRequest::new(target, "on").with_duration(self.on_duration));
        }
        let idle = occupancy
            .last_motion
            .is_none_or(|at| elapsed_at_least(at, now, self.timeout));
        if !occupied && occupancy.target_on && idle {
            occupancy.target_on = false;
            info!(device = %self.name(), target, "no motion, switching target off");
            return Some(SwitchRequest::new(target, "off").with_duration(self.off_duration));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use glowhub_domain::config::DeviceOptions;

    use super::*;

    fn sensor(target: Option<&str>) -> MotionSensor {
        let config = DeviceConfig::new("motion_sensor", "hall-motion")
            .with_topic("zigbee2mqtt/hall-motion")
            .with_options(DeviceOptions {
                target: target.map(str::to_string),
                timeout: Some(120),
                target_off_duration: Some(5),
                ..DeviceOptions::default()
            });
        MotionSensor::from_config(&config)
    }

    #[test]
    fn should_switch_target_on_once_when_motion_detected() {
        let sensor = sensor(Some("hall"));
        sensor.handle_state(br#"{"occupancy":true}"#);
        assert!(sensor.is_occupied());

        let request = sensor.follow_up_request(now()).unwrap();
        assert_eq!(request, SwitchRequest::new("hall", "on"));
        assert_eq!(sensor.follow_up_request(now()), None);
    }

    #[test]
    fn should_switch_target_off_after_timeout() {
        let sensor = sensor(Some("hall"));
        sensor.handle_state(br#"{"occupancy":true}"#);
        sensor.follow_up_request(now());
        sensor.handle_state(br#"{"occupancy":false}"#);

        let start = sensor.last_motion().unwrap();
        assert_eq!(sensor.follow_up_request(start + TimeDelta::seconds(60)), None);

        let request = sensor
            .follow_up_request(start + TimeDelta::seconds(121))
            .unwrap();
        assert_eq!(request, SwitchRequest::new("hall", "off").with_duration(5));
        assert_eq!(sensor.follow_up_request(start + TimeDelta::seconds(200)), None);
    }

    #[test]
    fn should_keep_target_on_while_occupied() {
        let sensor = sensor(Some("hall"));
        sensor.handle_state(br#"{"occupancy":true}"#);
        sensor.follow_up_request(now());
        assert_eq!(
            sensor.follow_up_request(now() + TimeDelta::seconds(600)),
            None
        );
    }

    #[test]
    fn should_only_observe_without_target() {
        let sensor = sensor(None);
        sensor.handle_state(br#"{"occupancy":true,"battery":64}"#);
        assert_eq!(sensor.follow_up_request(now()), None);
        assert_eq!(sensor.status().battery, Some(64));
    }
}
