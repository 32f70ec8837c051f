//! Action clause of a rule.

use std::sync::Arc;

use crate::device::Device;

/// Key whose value sets the transition duration of the other receivers of
/// the same device.
pub const DURATION_KEY: &str = "duration";

pub struct Receiver {
    device: Arc<dyn Device>,
    key: String,
    value: String,
}

impl Receiver {
    #[must_use]
    pub fn new(device: Arc<dyn Device>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            device,
            key: key.into(),
            value: value.into(),
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
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn is_duration(&self) -> bool {
        self.key == DURATION_KEY
    }
}

impl std::fmt::Display for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} = {}", self.device.name(), self.key, self.value)
    }
}
