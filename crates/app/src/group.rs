//! Group aggregator: several same-kind devices acting as one.

use std::sync::Arc;
use std::time::Duration;

use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use glowhub_domain::status::DeviceStatus;
use tracing::warn;

use crate::device::{Device, DeviceCore, DeviceInfo};
use crate::dimmable::Dimmable;
use crate::registry::Registry;

/// Why a group could not be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("group `{0}` has no members")]
    NoMembers(String),

    #[error("group `{group}` references unknown device `{member}`")]
    UnknownMember { group: String, member: String },

    #[error("group `{group}` mixes `{expected}` with `{member}` of type `{found}`")]
    MixedTypes {
        group: String,
        expected: String,
        member: String,
        found: String,
    },
}

/// A virtual device made of members sharing one type.
///
/// Its value is the highest member value and its range spans the widest
/// member bounds. Requests are forwarded to every member.
pub struct Group {
    dimmable: Dimmable,
    members: Vec<Arc<dyn Device>>,
}

impl Group {
    /// Build a group from its configuration, resolving members in `registry`.
    ///
    /// # Errors
    ///
    /// Fails if the member list is empty, names an unknown device, or mixes
    /// device types. A partial group is never built.
    pub fn from_config(
        config: &DeviceConfig,
        registry: &Registry,
        cycle_length: Duration,
    ) -> Result<Self, GroupError> {
        let members = config
            .options
            .devices
            .iter()
            .map(|member| {
                registry
                    .get(member)
                    .cloned()
                    .ok_or_else(|| GroupError::UnknownMember {
                        group: config.name.clone(),
                        member: member.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let first = members
            .first()
            .ok_or_else(|| GroupError::NoMembers(config.name.clone()))?;
        if let Some(odd) = members.iter().find(|m| m.kind() != first.kind()) {
            return Err(GroupError::MixedTypes {
                group: config.name.clone(),
                expected: first.kind().to_string(),
                member: odd.name().to_string(),
                found: odd.kind().to_string(),
            });
        }

        let info = DeviceInfo::new(&config.name, first.kind())
            .with_label(config.display_label())
            .hidden(config.hidden)
            .with_receivers(first.receivers().iter().cloned());
        let min = members.iter().map(|m| m.min()).fold(f64::INFINITY, f64::min);
        let max = members
            .iter()
            .map(|m| m.max())
            .fold(f64::NEG_INFINITY, f64::max);
        let dimmable = Dimmable::new(info, min, max, cycle_length);

        let group = Self { dimmable, members };
        group.dimmable.sync(group.aggregate());
        Ok(group)
    }

    #[must_use]
    pub fn members(&self) -> &[Arc<dyn Device>] {
        &self.members
    }

    fn aggregate(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.current())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[allow(clippy::float_cmp)]
    fn resync(&self) -> f64 {
        let value = self.aggregate();
        if self.dimmable.current() != value {
            self.dimmable.core().set_current(value);
        }
        value
    }
}

impl Device for Group {
    fn core(&self) -> &DeviceCore {
        self.dimmable.core()
    }

    fn current(&self) -> f64 {
        self.aggregate()
    }

    fn min(&self) -> f64 {
        self.members.iter().map(|m| m.min()).fold(f64::INFINITY, f64::min)
    }

    fn max(&self) -> f64 {
        self.members
            .iter()
            .map(|m| m.max())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn set_current(&self, value: f64) {
        for member in &self.members {
            member.set_current(value);
        }
        self.resync();
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        for member in &self.members {
            if let Err(err) = member.process_request(request) {
                warn!(group = %self.name(), member = %member.name(), error = %err, "member rejected request");
            }
        }
        self.resync();
        if let Ok(value) = self.dimmable.resolve(request) {
            self.dimmable.set_level(value, request.duration);
        }
        Ok(())
    }

    fn update_value(&self, tick: u64) -> Option<f64> {
        self.core().once_per_tick(tick, || {
            let changed = self
                .members
                .iter()
                .fold(false, |changed, member| member.update_value(tick).is_some() || changed);
            let value = self.resync();
            changed.then_some(value)
        })
    }

    fn status(&self) -> DeviceStatus {
        let mut status = self.dimmable.status();
        status.value = self.aggregate();
        status.min = self.min();
        status.max = self.max();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glowhub_domain::config::DeviceOptions;

    const CYCLE: Duration = Duration::from_millis(200);

    fn light(name: &str, max: f64) -> Arc<Dimmable> {
        Arc::new(Dimmable::new(
            DeviceInfo::new(name, "light").with_receivers(["value"]),
            0.0,
            max,
            CYCLE,
        ))
    }

    fn group_config(members: &[&str]) -> DeviceConfig {
        DeviceConfig::new("group", "living").with_options(DeviceOptions {
            devices: members.iter().map(ToString::to_string).collect(),
            ..DeviceOptions::default()
        })
    }

    fn registry_with(devices: &[Arc<Dimmable>]) -> Registry {
        let mut registry = Registry::new();
        for device in devices {
            registry.insert(device.clone()).unwrap();
        }
        registry
    }

    #[test]
    fn should_report_highest_member_value() {
        let a = light("a", 100.0);
        let b = light("b", 100.0);
        a.sync(30.0);
        b.sync(70.0);
        let registry = registry_with(&[a, b]);

        let group = Group::from_config(&group_config(&["a", "b"]), &registry, CYCLE).unwrap();
        assert_eq!(group.current(), 70.0);
        assert_eq!(group.kind(), "light");
    }

    #[test]
    fn should_span_widest_member_bounds() {
        let registry = registry_with(&[light("a", 100.0), light("b", 254.0)]);
        let group = Group::from_config(&group_config(&["a", "b"]), &registry, CYCLE).unwrap();
        assert_eq!(group.min(), 0.0);
        assert_eq!(group.max(), 254.0);
    }

    #[test]
    fn should_fail_when_member_unknown() {
        let registry = registry_with(&[light("a", 100.0)]);
        let err = Group::from_config(&group_config(&["a", "ghost"]), &registry, CYCLE)
            .err()
            .unwrap();
        assert_eq!(
            err,
            GroupError::UnknownMember {
                group: "living".to_string(),
                member: "ghost".to_string()
            }
        );
    }

    #[test]
    fn should_fail_when_member_types_differ() {
        let plug = Arc::new(Dimmable::new(
            DeviceInfo::new("kettle", "plug"),
            0.0,
            1.0,
            CYCLE,
        ));
        let registry = registry_with(&[light("a", 100.0), plug]);
        let err = Group::from_config(&group_config(&["a", "kettle"]), &registry, CYCLE)
            .err()
            .unwrap();
        assert!(matches!(err, GroupError::MixedTypes { .. }));
    }

    #[test]
    fn should_fail_when_group_is_empty() {
        let registry = Registry::new();
        assert!(matches!(
            Group::from_config(&group_config(&[]), &registry, CYCLE),
            Err(GroupError::NoMembers(_))
        ));
    }

    #[test]
    fn should_forward_requests_and_follow_members() {
        let a = light("a", 100.0);
        let b = light("b", 100.0);
        let registry = registry_with(&[a.clone(), b.clone()]);
        let group = Group::from_config(&group_config(&["a", "b"]), &registry, CYCLE).unwrap();

        group
            .process_request(&SwitchRequest::new("living", "60"))
            .unwrap();
        assert_eq!(a.target(), Some(60.0));
        assert_eq!(b.target(), Some(60.0));
        assert_eq!(group.status().target, Some(60.0));

        assert_eq!(group.update_value(1), Some(60.0));
        assert_eq!(a.current(), 60.0);
        assert_eq!(b.current(), 60.0);
        assert_eq!(group.update_value(2), None);
    }

    #[test]
    fn should_not_double_step_members_in_one_tick() {
        let a = light("a", 100.0);
        let registry = registry_with(&[a.clone()]);
        let group = Group::from_config(&group_config(&["a"]), &registry, CYCLE).unwrap();

        group
            .process_request(&SwitchRequest::new("living", "100").with_duration(10))
            .unwrap();
        a.update_value(1);
        group.update_value(1);
        assert_eq!(a.current(), 2.0);
    }
}
