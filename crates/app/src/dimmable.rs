//! Transition state machine shared by every dimmable device.
//!
//! A request sets a `target` and derives a per-tick `step` from the
//! requested duration; each scheduler tick then moves `current` one step
//! closer until it lands exactly on the target.

use std::time::Duration;

use glowhub_domain::request::{ParseValueError, ParsedValue, SwitchRequest};
use glowhub_domain::status::DeviceStatus;
use tracing::debug;

use crate::device::{Device, DeviceCore, DeviceInfo};

/// Step used when a transition is pending but no step was derived.
pub const DEFAULT_STEP: f64 = 100.0;

/// Relative slack under which the last step lands on the target, absorbing
/// the rounding accumulated by repeated float steps.
const STEP_TOLERANCE: f64 = 1e-9;

/// Transition bookkeeping, stored under the device lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub target: Option<f64>,
    pub step: f64,
    /// Last value pushed to the physical device.
    pub last_sent: Option<f64>,
    /// Seconds the physical device should take, in transition mode.
    pub transition_time: Option<u64>,
}

/// A device whose value moves smoothly between `min` and `max`.
///
/// Usable on its own and embedded by lights and groups.
#[derive(Debug)]
pub struct Dimmable {
    core: DeviceCore,
    min: f64,
    max: f64,
    transition_mode: bool,
    cycle_length: Duration,
}

impl Dimmable {
    #[must_use]
    pub fn new(info: DeviceInfo, min: f64, max: f64, cycle_length: Duration) -> Self {
        let core = DeviceCore::new(info);
        core.write(|state| {
            state.current = min;
            state.transition.target = Some(min);
        });
        Self {
            core,
            min,
            max,
            transition_mode: false,
            cycle_length,
        }
    }

    /// Jump straight to the target and let the physical device animate.
    #[must_use]
    pub fn with_transition_mode(mut self, enabled: bool) -> Self {
        self.transition_mode = enabled;
        self
    }

    #[must_use]
    pub fn transition_mode(&self) -> bool {
        self.transition_mode
    }

    #[must_use]
    pub fn target(&self) -> Option<f64> {
        self.core.read(|state| state.transition.target)
    }

    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_moving(&self) -> bool {
        self.core
            .read(|state| state.transition.target.is_some_and(|t| t != state.current))
    }

    /// Resolve a request value against this device's range.
    ///
    /// Relative values are applied to the current value at request time.
    /// `on` and `off` map to the upper and lower bound.
    ///
    /// # Errors
    ///
    /// Returns [`ParseValueError`] for any other token.
    pub fn resolve(&self, request: &SwitchRequest) -> Result<f64, ParseValueError> {
        match request.parsed_value() {
            ParsedValue::Absolute(value) => Ok(value),
            ParsedValue::Relative(offset) => Ok(self.core.current() + offset),
            ParsedValue::Token(token) if token == "on" => Ok(self.max),
            ParsedValue::Token(token) if token == "off" => Ok(self.min),
            ParsedValue::Token(_) => Err(ParseValueError::new(self.core.info().name.as_str(), request)),
        }
    }

    /// Start a transition toward `value` over `duration` seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn set_level(&self, value: f64, duration: u64) {
        let target = value.max(self.min).min(self.max);
        let cycle_ms = self.cycle_length.as_millis().max(1);
        let transition_mode = self.transition_mode;
        self.core.write(|state| {
            let distance = (state.current - target).abs();
            let transition = &mut state.transition;
            transition.target = Some(target);
            if transition_mode {
                transition.step = 0.0;
                transition.transition_time = Some(duration);
            } else if duration == 0 {
                transition.step = distance;
            } else {
                let cycles = (u128::from(duration) * 1000 / cycle_ms).max(1);
                transition.step = distance / cycles as f64;
            }
        });
        debug!(device = %self.core.info().name, target, duration, "transition started");
    }

    /// Adopt a value reported by the physical device, ending any transition.
    #[allow(clippy::float_cmp)]
    pub fn sync(&self, value: f64) {
        let value = value.max(self.min).min(self.max);
        let changed = self.core.write(|state| {
            state.transition.target = Some(value);
            state.transition.last_sent = Some(value);
            state.current != value
        });
        if changed {
            self.core.set_current(value);
        }
    }

    /// Record `value` as sent. Returns `false` if it already was.
    pub fn mark_sent(&self, value: f64) -> bool {
        self.core.write(|state| {
            if state.transition.last_sent == Some(value) {
                false
            } else {
                state.transition.last_sent = Some(value);
                true
            }
        })
    }

    /// Transition time hint to publish, consumed once.
    pub fn take_transition_time(&self) -> Option<u64> {
        self.core.write(|state| state.transition.transition_time.take())
    }

    #[allow(clippy::float_cmp)]
    fn next_value(&self) -> Option<f64> {
        let transition_mode = self.transition_mode;
        self.core.read(|state| {
            let current = state.current;
            let target = state.transition.target?;
            if current == target {
                return None;
            }
            if transition_mode {
                return Some(target);
            }
            let step = if state.transition.step > 0.0 {
                state.transition.step
            } else {
                DEFAULT_STEP
            };
            Some(if (target - current).abs() <= step * (1.0 + STEP_TOLERANCE) {
                target
            } else if current < target {
                current + step
            } else {
                current - step
            })
        })
    }
}

impl Device for Dimmable {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        if !request.is_value_key() {
            return Err(ParseValueError::new(self.name(), request));
        }
        let value = self.resolve(request)?;
        self.set_level(value, request.duration);
        Ok(())
    }

    fn update_value(&self, tick: u64) -> Option<f64> {
        self.core.once_per_tick(tick, || {
            let next = self.next_value()?;
            self.set_current(next);
            Some(self.current())
        })
    }

    fn status(&self) -> DeviceStatus {
        self.core.status(self.min, self.max)
    }
}
