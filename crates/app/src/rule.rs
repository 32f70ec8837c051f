//! Rule engine: AND-combined triggers firing receiver commands.
//!
//! A [`Rule`] holds strong references to the devices it watches and drives;
//! each watched device holds a weak back-reference to the rule so it can
//! push observations into the matching [`Trigger`]s. Rules are owned by a
//! [`RuleSet`], which attaches them on insert and detaches them on removal.

pub mod receiver;
pub mod trigger;

use std::fmt;
use std::sync::Arc;

use glowhub_domain::config::RuleConfig;
use glowhub_domain::error::ValidationError;
use glowhub_domain::id::RuleId;
use glowhub_domain::request::SwitchRequest;
use glowhub_domain::time::{Timestamp, now};
use glowhub_domain::value::Value;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::device::Device;
use crate::registry::Registry;

pub use receiver::Receiver;
pub use trigger::{Observation, Trigger};

/// Why a rule could not be built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("{role} device `{name}` is not registered")]
    UnknownDevice { role: &'static str, name: String },

    #[error("invalid rule")]
    Invalid(#[from] ValidationError),

    #[error("no clock device is registered")]
    NoClock,

    #[error("delay of {0} seconds is out of range")]
    DelayOutOfRange(u64),
}

pub struct Rule {
    id: RuleId,
    name: String,
    triggers: Vec<Trigger>,
    receivers: Vec<Receiver>,
    single_use: bool,
}

impl Rule {
    /// Resolve a rule configuration against the registry.
    ///
    /// Inactive triggers are left out. A rule with no trigger left is
    /// accepted but never fires.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the rule has no receivers or references a
    /// device that is not registered.
    pub fn from_config(config: &RuleConfig, registry: &Registry) -> Result<Self, RuleError> {
        config.validate()?;
        let lookup = |role: &'static str, name: &str| {
            registry
                .get(name)
                .cloned()
                .ok_or_else(|| RuleError::UnknownDevice {
                    role,
                    name: name.to_string(),
                })
        };

        let triggers = config
            .active_triggers()
            .map(|t| {
                lookup("trigger", &t.device)
                    .map(|device| Trigger::new(device, &t.key, t.condition.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let receivers = config
            .receivers
            .iter()
            .map(|r| lookup("receiver", &r.device).map(|device| Receiver::new(device, &r.key, &r.value)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: RuleId::new(),
            name: config.name.clone(),
            triggers,
            receivers,
            single_use: config.single_use,
        })
    }

    #[must_use]
    pub fn id(&self) -> RuleId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    #[must_use]
    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }

    #[must_use]
    pub fn single_use(&self) -> bool {
        self.single_use
    }

    /// Register with every watched device and arm triggers whose current
    /// value is already known, such as calendar fields.
    pub fn attach(self: &Arc<Self>) {
        let at = now();
        for trigger in &self.triggers {
            let device = trigger.device();
            device.add_rule(self);
            if let Some(value) = device.armed_value(trigger.key()) {
                trigger.observe(&value, at);
            }
        }
    }

    /// Drop the back-reference from every watched device.
    pub fn detach(&self) {
        for trigger in &self.triggers {
            trigger.device().remove_rule(self);
        }
    }

    /// Feed an observation from `device` into the matching triggers.
    pub fn observe(&self, device: &str, key: &str, value: &Value, at: Timestamp) {
        for trigger in self.triggers.iter().filter(|t| t.matches(device, key)) {
            trigger.observe(value, at);
        }
    }

    /// Whether every trigger currently holds. Coercion failures are logged
    /// and count as `false`; a rule without triggers never holds.
    #[must_use]
    pub fn check_triggers(&self, now: Timestamp) -> bool {
        !self.triggers.is_empty()
            && self.triggers.iter().all(|trigger| {
                trigger.evaluate(now).unwrap_or_else(|err| {
                    warn!(rule = %self.label(), trigger = %trigger, error = %err, "trigger not comparable");
                    false
                })
            })
    }

    /// Materialize the receivers into requests, one per device and key.
    ///
    /// A `duration` receiver sets the duration of every request for its
    /// device instead of producing one of its own.
    #[must_use]
    pub fn fire(&self) -> Vec<SwitchRequest> {
        let mut requests: Vec<SwitchRequest> = Vec::new();
        let mut durations: Vec<(&str, u64)> = Vec::new();

        for receiver in &self.receivers {
            let device = receiver.device().name();
            if receiver.is_duration() {
                match receiver.value().trim().parse::<u64>() {
                    Ok(seconds) => durations.push((device, seconds)),
                    Err(err) => {
                        warn!(rule = %self.label(), device, value = receiver.value(), error = %err, "invalid duration, receiver skipped");
                    }
                }
                continue;
            }
            match requests
                .iter_mut()
                .find(|r| r.device == device && r.key == receiver.key())
            {
                Some(existing) => existing.value = receiver.value().to_string(),
                None => requests.push(
                    SwitchRequest::new(device, receiver.value()).with_key(receiver.key()),
                ),
            }
        }

        for (device, seconds) in durations {
            let mut matched = false;
            for request in requests.iter_mut().filter(|r| r.device == device) {
                request.duration = seconds;
                matched = true;
            }
            if !matched {
                warn!(rule = %self.label(), device, "duration without a value, nothing to send");
            }
        }

        debug!(rule = %self.label(), requests = requests.len(), "rule fired");
        requests
    }

    /// Re-arm the rule: forget observations, except on persistent keys.
    pub fn clear_triggers(&self) {
        for trigger in &self.triggers {
            let device = trigger.device();
            if device.is_persistent(trigger.key()) {
                continue;
            }
            trigger.clear();
            device.clear_trigger(trigger.key());
        }
    }

    fn label(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: when ", self.label())?;
        if self.triggers.is_empty() {
            f.write_str("never")?;
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{trigger}")?;
        }
        f.write_str(" then ")?;
        for (i, receiver) in self.receivers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{receiver}")?;
        }
        if self.single_use {
            f.write_str(" (once)")?;
        }
        Ok(())
    }
}

/// The active rules.
#[derive(Default)]
pub struct RuleSet {
    rules: Mutex<Vec<Arc<Rule>>>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `rule` to its devices and make it active.
    pub fn add(&self, rule: Rule) -> Arc<Rule> {
        let rule = Arc::new(rule);
        rule.attach();
        self.rules.lock().push(rule.clone());
        rule
    }

    /// Deactivate a rule and detach it from its devices.
    pub fn remove(&self, id: RuleId) -> Option<Arc<Rule>> {
        let rule = {
            let mut rules = self.rules.lock();
            let index = rules.iter().position(|rule| rule.id() == id)?;
            rules.remove(index)
        };
        rule.detach();
        Some(rule)
    }

    /// Active rules, copied out of the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Rule>> {
        self.rules.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }
}
