//! # glowhub-adapter-devices
//!
//! Concrete device drivers and the factory turning `[[devices]]`
//! configuration into a populated [`Registry`].
//!
//! ## Provided drivers
//!
//! | `type` | Driver | Behaviour |
//! |--------|--------|-----------|
//! | `light` | [`Light`] | Dimmable, publishes `{state, brightness, transition}` |
//! | `plug` | [`Plug`] | On/off, accepts `on`/`off`/`1`/`0`/`toggle` |
//! | `switch` | [`Switch`] | Button presses as triggers |
//! | `sensor` | [`Sensor`] | Configured payload fields as triggers |
//! | `motion_sensor` | [`MotionSensor`] | Occupancy, optional auto on/off of a target |
//! | `thermostat` | [`Thermostat`] | Heats a target with a hysteresis margin |
//! | `group` | [`Group`] | Same-kind members acting as one |
//!
//! The calendar device `time` is always registered.
//!
//! ## Dependency rule
//!
//! Depends on `glowhub-app` (device contract, transport port) and
//! `glowhub-domain` only.

mod devices;

use std::sync::Arc;
use std::time::Duration;

use glowhub_app::clock::Clock;
use glowhub_app::device::Device;
use glowhub_app::group::{Group, GroupError};
use glowhub_app::registry::Registry;
use glowhub_domain::config::DeviceConfig;
use glowhub_domain::error::ValidationError;
use tracing::{info, warn};

pub use devices::{Light, MotionSensor, Plug, Sensor, Switch, Thermostat};

pub const GROUP: &str = "group";

/// Why one configured device was not registered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Group(#[from] GroupError),
}

/// Build one non-group device.
///
/// # Errors
///
/// Returns [`ValidationError`] for unknown types and missing or
/// inconsistent options.
pub fn build_device(
    config: &DeviceConfig,
    cycle_length: Duration,
) -> Result<Arc<dyn Device>, ValidationError> {
    config.validate()?;
    let device: Arc<dyn Device> = match config.kind.as_str() {
        "light" => Arc::new(Light::from_config(config, cycle_length)),
        "plug" => Arc::new(Plug::from_config(config)),
        "switch" => Arc::new(Switch::from_config(config)),
        "sensor" => Arc::new(Sensor::from_config(config)),
        "motion_sensor" => Arc::new(MotionSensor::from_config(config)),
        "thermostat" => Arc::new(Thermostat::from_config(config)?),
        other => return Err(ValidationError::UnknownDeviceType(other.to_string())),
    };
    Ok(device)
}

/// Build the registry from configuration.
///
/// Plain devices are built first so groups can resolve their members.
/// Entries that fail are logged and skipped; the rest of the registry is
/// still usable.
#[must_use]
pub fn build_registry(configs: &[DeviceConfig], cycle_length: Duration) -> Registry {
    let mut registry = Registry::new();
    if let Err(err) = registry.insert_clock(Arc::new(Clock::new())) {
        warn!(error = %err, "calendar device not registered");
    }

    let (groups, devices): (Vec<_>, Vec<_>) =
        configs.iter().partition(|config| config.kind == GROUP);

    for config in devices {
        let result = build_device(config, cycle_length)
            .and_then(|device| registry.insert(device))
            .map_err(BuildError::from);
        report(config, result);
    }
    for config in groups {
        let result = build_group(config, &mut registry, cycle_length);
        report(config, result);
    }

    info!(devices = registry.len(), "registry built");
    registry
}

fn build_group(
    config: &DeviceConfig,
    registry: &mut Registry,
    cycle_length: Duration,
) -> Result<(), BuildError> {
    config.validate()?;
    let group = Group::from_config(config, registry, cycle_length)?;
    registry.insert(Arc::new(group))?;
    Ok(())
}

fn report(config: &DeviceConfig, result: Result<(), BuildError>) {
    match result {
        Ok(()) => info!(device = %config.name, kind = %config.kind, "device registered"),
        Err(err) => warn!(device = %config.name, error = %err, "device skipped"),
    }
}

#[cfg(test)]
mod tests {
    use glowhub_app::clock::CLOCK_NAME;
    use glowhub_domain::config::DeviceOptions;
    use glowhub_domain::request::SwitchRequest;

    use super::*;

    const CYCLE: Duration = Duration::from_millis(200);

    fn light(name: &str) -> DeviceConfig {
        DeviceConfig::new("light", name).with_topic(format!("zigbee2mqtt/{name}"))
    }

    fn group(name: &str, members: &[&str]) -> DeviceConfig {
        DeviceConfig::new(GROUP, name).with_options(DeviceOptions {
            devices: members.iter().map(ToString::to_string).collect(),
            ..DeviceOptions::default()
        })
    }

    #[test]
    fn should_register_every_driver_kind() {
        let thermostat = DeviceConfig::new("thermostat", "thermostat").with_options(DeviceOptions {
            target: Some("heater".to_string()),
            ..DeviceOptions::default()
        });
        let configs = vec![
            light("desk"),
            DeviceConfig::new("plug", "heater"),
            DeviceConfig::new("switch", "remote"),
            DeviceConfig::new("sensor", "bathroom"),
            DeviceConfig::new("motion_sensor", "hall-motion"),
            thermostat,
        ];
        let registry = build_registry(&configs, CYCLE);
        assert_eq!(registry.len(), configs.len() + 1);
        assert_eq!(registry.get("remote").map(|d| d.kind()), Some("switch"));
        assert!(registry.get(CLOCK_NAME).is_some());
        assert!(registry.clock().is_some());
    }

    #[test]
    fn should_build_groups_after_their_members() {
        let configs = vec![group("living", &["desk", "sofa"]), light("desk"), light("sofa")];
        let registry = build_registry(&configs, CYCLE);
        let living = registry.get("living").unwrap();
        assert_eq!(living.kind(), "light");

        living.process_request(&SwitchRequest::new("living", "on")).unwrap();
        let desk = registry.get("desk").unwrap();
        desk.update_value(1);
        assert!((desk.current() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_skip_invalid_entries_and_keep_the_rest() {
        let configs = vec![
            light("desk"),
            light("desk"),
            DeviceConfig::new("blind", "shade"),
            DeviceConfig::new("thermostat", "no-target"),
            group("broken", &["desk", "ghost"]),
            group("mixed", &["desk", "heater"]),
            DeviceConfig::new("plug", "heater"),
            DeviceConfig::new("light", " "),
        ];
        let registry = build_registry(&configs, CYCLE);
        let names: Vec<&str> = registry.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["desk", "heater", CLOCK_NAME]);
    }

    #[test]
    fn should_reject_unknown_type() {
        let err = build_device(&DeviceConfig::new("blind", "shade"), CYCLE).err();
        assert_eq!(
            err,
            Some(ValidationError::UnknownDeviceType("blind".to_string()))
        );
    }
}
