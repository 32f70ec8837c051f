//! Name-keyed registry of live devices.
//!
//! Built once at startup, then shared read-only by the dispatcher, the
//! scheduler, the rule engine and the HTTP layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use glowhub_domain::error::ValidationError;
use glowhub_domain::status::DeviceStatus;

use crate::clock::Clock;
use crate::device::Device;

#[derive(Default)]
pub struct Registry {
    devices: BTreeMap<String, Arc<dyn Device>>,
    clock: Option<Arc<Clock>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under its name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateName`] if the name is taken.
    pub fn insert(&mut self, device: Arc<dyn Device>) -> Result<(), ValidationError> {
        let name = device.name().to_string();
        if self.devices.contains_key(&name) {
            return Err(ValidationError::DuplicateName(name));
        }
        self.devices.insert(name, device);
        Ok(())
    }

    /// Register the calendar device, keeping a typed handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateName`] if its name is taken.
    pub fn insert_clock(&mut self, clock: Arc<Clock>) -> Result<(), ValidationError> {
        self.insert(clock.clone())?;
        self.clock = Some(clock);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Device>> {
        self.devices.get(name)
    }

    /// The calendar device used to schedule one-off rules.
    #[must_use]
    pub fn clock(&self) -> Option<&Arc<Clock>> {
        self.clock.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Device>)> {
        self.devices.iter().map(|(name, device)| (name.as_str(), device))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Arc<dyn Device>> {
        self.devices.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Status of every device, each read under its own lock.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DeviceStatus> {
        self.devices
            .iter()
            .map(|(name, device)| (name.clone(), device.status()))
            .collect()
    }
}
