//! Watch clause of a rule and its observed state.

use std::sync::Arc;

use glowhub_domain::condition::Condition;
use glowhub_domain::time::Timestamp;
use glowhub_domain::value::{CoercionError, Value};
use parking_lot::Mutex;

use crate::device::Device;

/// Last value seen for a trigger and when it last changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub last_value: Option<Value>,
    pub last_changed: Option<Timestamp>,
}

/// A `(device, key, condition)` clause.
///
/// The observation is only written by the watched device, through
/// [`Rule::observe`](super::Rule::observe).
pub struct Trigger {
    device: Arc<dyn Device>,
    key: String,
    condition: Condition,
    observed: Mutex<Observation>,
}

impl Trigger {
    #[must_use]
    pub fn new(device: Arc<dyn Device>, key: impl Into<String>, condition: Condition) -> Self {
        Self {
            device,
            key: key.into(),
            condition,
            observed: Mutex::new(Observation::default()),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    #[must_use]
    pub fn matches(&self, device: &str, key: &str) -> bool {
        self.key == key && self.device.name() == device
    }

    /// Record an observed value. The change timestamp only moves when the
    /// value differs from the previous observation, so a device repeating
    /// the same reading does not restart a delay window.
    pub fn observe(&self, value: &Value, at: Timestamp) {
        let mut observed = self.observed.lock();
        if observed.last_value.as_ref() != Some(value) {
            observed.last_changed = Some(at);
        }
        observed.last_value = Some(value.clone());
    }

    #[must_use]
    pub fn observation(&self) -> Observation {
        self.observed.lock().clone()
    }

    pub fn clear(&self) {
        *self.observed.lock() = Observation::default();
    }

    /// # Errors
    ///
    /// Returns [`CoercionError`] when the observed value cannot be compared
    /// with the configured one.
    pub fn evaluate(&self, now: Timestamp) -> Result<bool, CoercionError> {
        let Observation {
            last_value,
            last_changed,
        } = self.observation();
        self.condition
            .evaluate(last_value.as_ref(), last_changed, now)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} {}", self.device.name(), self.key, self.condition)
    }
}
