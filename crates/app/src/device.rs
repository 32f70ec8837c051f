//! Device capability contract.
//!
//! Every controllable or observable entity implements [`Device`]. The
//! runtime (dispatcher, scheduler, rule engine, HTTP layer) only ever sees
//! `Arc<dyn Device>`; concrete drivers live in the device adapter crate.
//!
//! Shared bookkeeping (identity, current value, timestamps, telemetry and
//! the back-references to rules) is provided by [`DeviceCore`], which every
//! implementation embeds and exposes through [`Device::core`].

use std::sync::{Arc, Weak};

use glowhub_domain::config::DeviceConfig;
use glowhub_domain::request::{DEFAULT_KEY, ParseValueError, SwitchRequest};
use glowhub_domain::status::DeviceStatus;
use glowhub_domain::time::{Timestamp, now};
use glowhub_domain::value::Value;
use parking_lot::{Mutex, RwLock};

use crate::dimmable::Transition;
use crate::ports::{Transport, TransportError};
use crate::rule::Rule;

/// Trigger key carrying the battery level reported by a device.
pub const BATTERY_KEY: &str = "battery";

/// The capability every device kind implements.
///
/// Implementations must be safe to call concurrently from the scheduler,
/// the dispatcher, inbound transport callbacks and status snapshots.
pub trait Device: Send + Sync {
    fn core(&self) -> &DeviceCore;

    fn name(&self) -> &str {
        &self.core().info().name
    }

    fn kind(&self) -> &str {
        &self.core().info().kind
    }

    fn label(&self) -> &str {
        &self.core().info().label
    }

    fn hidden(&self) -> bool {
        self.core().info().hidden
    }

    /// Keys this device notifies rules about.
    fn triggers(&self) -> &[String] {
        &self.core().info().triggers
    }

    /// Keys this device accepts as automation inputs.
    fn receivers(&self) -> &[String] {
        &self.core().info().receivers
    }

    fn has_receivers(&self) -> bool {
        !self.receivers().is_empty()
    }

    /// Whether the last observed value of `key` survives a rule clear.
    fn is_persistent(&self, key: &str) -> bool {
        self.core().info().persistent.iter().any(|k| k == key)
    }

    fn current(&self) -> f64 {
        self.core().current()
    }

    fn min(&self) -> f64 {
        0.0
    }

    fn max(&self) -> f64 {
        1.0
    }

    /// Set the current value, clamped to the device bounds, and notify rules.
    fn set_current(&self, value: f64) {
        self.core().set_current(value.max(self.min()).min(self.max()));
    }

    fn last_changed(&self) -> Option<Timestamp> {
        self.core().last_changed()
    }

    /// Apply a command addressed to this device.
    ///
    /// # Errors
    ///
    /// Returns [`ParseValueError`] when the key or value make no sense for
    /// this device. The request is then dropped.
    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError>;

    /// Advance the device by one scheduler tick.
    ///
    /// Returns the new value when it changed. A device is stepped at most
    /// once per `tick`, so repeated calls within a tick (a group polling its
    /// members) return the same result.
    fn update_value(&self, _tick: u64) -> Option<f64> {
        None
    }

    /// Push the current value to the physical device.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the transport rejects the message.
    fn publish_value(&self, _transport: &dyn Transport) -> Result<(), TransportError> {
        Ok(())
    }

    /// Ask the physical device to report its state.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the transport rejects the message.
    fn poll_value(&self, _transport: &dyn Transport) -> Result<(), TransportError> {
        Ok(())
    }

    /// Topic inbound state is read from, `None` when not subscribable.
    fn state_topic(&self) -> Option<&str> {
        self.core().info().state_topic.as_deref()
    }

    /// Handle a state message received on [`state_topic`](Self::state_topic).
    fn handle_state(&self, _payload: &[u8]) {
    }

    /// A request the device wants issued on its own, such as switching a
    /// light off after a motion timeout.
    fn follow_up_request(&self, _now: Timestamp) -> Option<SwitchRequest> {
        None
    }

    /// Current value of a trigger key, used to arm persistent triggers.
    fn trigger_value(&self, key: &str) -> Option<Value> {
        self.core().trigger_value(key)
    }

    /// Value a newly attached trigger on `key` starts from.
    ///
    /// Only persistent keys are armed by default; a momentary value such as
    /// a button press must be observed after the rule exists.
    fn armed_value(&self, key: &str) -> Option<Value> {
        if self.is_persistent(key) {
            self.trigger_value(key)
        } else {
            None
        }
    }

    /// Forget a one-shot trigger value after the rule using it has fired.
    fn clear_trigger(&self, _key: &str) {
    }

    fn add_rule(&self, rule: &Arc<Rule>) {
        self.core().rules().add(rule);
    }

    fn remove_rule(&self, rule: &Rule) {
        self.core().rules().remove(rule);
    }

    fn status(&self) -> DeviceStatus {
        self.core().status(self.min(), self.max())
    }
}

/// Static identity and automation surface of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: String,
    pub label: String,
    pub hidden: bool,
    /// Base topic of the physical device, empty when it has none.
    pub topic: String,
    pub state_topic: Option<String>,
    pub triggers: Vec<String>,
    pub receivers: Vec<String>,
    pub persistent: Vec<String>,
}

impl DeviceInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            kind: kind.into(),
            hidden: false,
            topic: String::new(),
            state_topic: None,
            triggers: vec![DEFAULT_KEY.to_string()],
            receivers: Vec::new(),
            persistent: vec![BATTERY_KEY.to_string()],
        }
    }

    /// Identity taken from a configuration entry. The state topic is the
    /// `state_topic` option, or the device topic itself.
    #[must_use]
    pub fn from_config(config: &DeviceConfig) -> Self {
        let state_topic = config
            .options
            .state_topic
            .clone()
            .or_else(|| Some(config.topic.clone()))
            .filter(|topic| !topic.is_empty());
        Self {
            label: config.display_label().to_string(),
            hidden: config.hidden,
            topic: config.topic.clone(),
            state_topic,
            ..Self::new(&config.name, &config.kind)
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    #[must_use]
    pub fn with_state_topic(mut self, topic: Option<String>) -> Self {
        self.state_topic = topic;
        self
    }

    #[must_use]
    pub fn with_triggers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.triggers = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_receivers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.receivers = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Mark additional keys as persistent. `battery` always is.
    #[must_use]
    pub fn with_persistent<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.persistent.extend(keys.into_iter().map(Into::into));
        self
    }
}

/// Mutable state guarded by the device lock.
#[derive(Debug, Clone, Default)]
pub struct CoreState {
    pub current: f64,
    pub last_changed: Option<Timestamp>,
    pub battery: Option<i64>,
    pub link_quality: Option<i64>,
    /// Only used by dimmable devices.
    pub transition: Transition,
}

/// Shared state and plumbing embedded in every device.
#[derive(Debug)]
pub struct DeviceCore {
    info: DeviceInfo,
    state: RwLock<CoreState>,
    tick: Mutex<Option<(u64, Option<f64>)>>,
    rules: RuleLinks,
}

impl DeviceCore {
    #[must_use]
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            state: RwLock::new(CoreState::default()),
            tick: Mutex::new(None),
            rules: RuleLinks::default(),
        }
    }

    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    #[must_use]
    pub fn current(&self) -> f64 {
        self.state.read().current
    }

    #[must_use]
    pub fn last_changed(&self) -> Option<Timestamp> {
        self.state.read().last_changed
    }

    /// Read the locked state.
    pub fn read<R>(&self, f: impl FnOnce(&CoreState) -> R) -> R {
        f(&self.state.read())
    }

    /// Mutate the locked state. The lock is released before returning, so
    /// `f` must not call back into rule propagation.
    pub fn write<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Store a new current value and notify rules watching `value`.
    ///
    /// Callers are responsible for clamping; see [`Device::set_current`].
    pub fn set_current(&self, value: f64) {
        {
            let mut state = self.state.write();
            state.current = value;
            state.last_changed = Some(now());
        }
        self.notify(DEFAULT_KEY, Value::Float(value));
    }

    /// Propagate an observed value to every rule watching this device.
    ///
    /// Never called with the device lock held.
    pub fn notify(&self, key: &str, value: Value) {
        let at = now();
        for rule in self.rules.live() {
            rule.observe(&self.info.name, key, &value, at);
        }
    }

    /// Run `step` at most once for `tick`, replaying its result on repeated
    /// calls within the same tick.
    pub fn once_per_tick(&self, tick: u64, step: impl FnOnce() -> Option<f64>) -> Option<f64> {
        let mut last = self.tick.lock();
        if let Some((seen, result)) = *last
            && seen == tick
        {
            return result;
        }
        let result = step();
        *last = Some((tick, result));
        result
    }

    /// Record `battery` and `linkquality` from an inbound JSON payload.
    pub fn record_telemetry(&self, payload: &serde_json::Value) {
        let battery = payload.get(BATTERY_KEY).and_then(serde_json::Value::as_i64);
        let link_quality = payload.get("linkquality").and_then(serde_json::Value::as_i64);
        let battery_changed = self.write(|state| {
            if link_quality.is_some() {
                state.link_quality = link_quality;
            }
            match battery {
                Some(level) if state.battery != Some(level) => {
                    state.battery = Some(level);
                    true
                }
                _ => false,
            }
        });
        if let (true, Some(level)) = (battery_changed, battery) {
            self.notify(BATTERY_KEY, Value::Int(level));
        }
    }

    /// Trigger values tracked by the core: `value` and `battery`.
    #[must_use]
    pub fn trigger_value(&self, key: &str) -> Option<Value> {
        let state = self.state.read();
        match key {
            DEFAULT_KEY => Some(Value::Float(state.current)),
            BATTERY_KEY => state.battery.map(Value::Int),
            _ => None,
        }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleLinks {
        &self.rules
    }

    /// Public snapshot, taken under the device read lock.
    #[must_use]
    pub fn status(&self, min: f64, max: f64) -> DeviceStatus {
        let state = self.state.read();
        DeviceStatus {
            kind: self.info.kind.clone(),
            label: self.info.label.clone(),
            hidden: self.info.hidden,
            value: state.current,
            target: state.transition.target,
            min,
            max,
            last_changed: state.last_changed,
            triggers: self.info.triggers.clone(),
            receivers: self.info.receivers.clone(),
            battery: state.battery,
            link_quality: state.link_quality,
            extra: std::collections::BTreeMap::new(),
        }
    }
}

/// Non-owning back-references from a device to the rules watching it.
#[derive(Debug, Default)]
pub struct RuleLinks {
    rules: RwLock<Vec<Weak<Rule>>>,
}

impl RuleLinks {
    pub fn add(&self, rule: &Arc<Rule>) {
        let weak = Arc::downgrade(rule);
        let mut rules = self.rules.write();
        rules.retain(|existing| existing.strong_count() > 0);
        if !rules.iter().any(|existing| Weak::ptr_eq(existing, &weak)) {
            rules.push(weak);
        }
    }

    pub fn remove(&self, rule: &Rule) {
        let target: *const Rule = rule;
        self.rules
            .write()
            .retain(|existing| existing.strong_count() > 0 && existing.as_ptr() != target);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().iter().filter(|r| r.strong_count() > 0).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upgrade the live links. The list lock is released on return.
    fn live(&self) -> Vec<Arc<Rule>> {
        self.rules.read().iter().filter_map(Weak::upgrade).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glowhub_domain::condition::{Condition, Operator};
    use glowhub_domain::config::{ReceiverConfig, RuleConfig, TriggerConfig};

    use crate::registry::Registry;

    struct Probe {
        core: DeviceCore,
    }

    impl Probe {
        fn new(name: &str) -> Self {
            Self {
                core: DeviceCore::new(
                    DeviceInfo::new(name, "probe")
                        .with_triggers(["value", "battery"])
                        .with_receivers(["value"]),
                ),
            }
        }
    }

    impl Device for Probe {
        fn core(&self) -> &DeviceCore {
            &self.core
        }

        fn max(&self) -> f64 {
            10.0
        }

        fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
            let value = request
                .value
                .parse()
                .map_err(|_| ParseValueError::new(self.name(), request))?;
            self.set_current(value);
            Ok(())
        }
    }

    fn watching_rule(registry: &Registry, key: &str) -> Arc<Rule> {
        let config = RuleConfig {
            name: "watch".to_string(),
            triggers: vec![TriggerConfig::new(
                "probe",
                key,
                Condition::new(Operator::Ge, 0),
            )],
            receivers: vec![ReceiverConfig::new("probe", "value", "1")],
            single_use: false,
        };
        let rule = Arc::new(Rule::from_config(&config, registry).unwrap());
        rule.attach();
        rule
    }

    #[test]
    fn should_clamp_when_setting_current_out_of_bounds() {
        let probe = Probe::new("probe");
        probe.set_current(42.0);
        assert!((probe.current() - 10.0).abs() < f64::EPSILON);
        probe.set_current(-3.0);
        assert!(probe.current().abs() < f64::EPSILON);
        assert!(probe.last_changed().is_some());
    }

    #[test]
    fn should_notify_rules_when_current_changes() {
        let mut registry = Registry::new();
        let probe = Arc::new(Probe::new("probe"));
        registry.insert(probe.clone()).unwrap();
        let rule = watching_rule(&registry, "value");
        // attaching arms nothing for non persistent keys
        assert!(!rule.check_triggers(now()));

        probe.set_current(4.0);
        assert!(rule.check_triggers(now()));
    }

    #[test]
    fn should_drop_link_when_rule_removed() {
        let mut registry = Registry::new();
        let probe = Arc::new(Probe::new("probe"));
        registry.insert(probe.clone()).unwrap();
        let rule = watching_rule(&registry, "value");
        assert_eq!(probe.core().rules().len(), 1);

        rule.attach();
        assert_eq!(probe.core().rules().len(), 1);

        rule.detach();
        assert!(probe.core().rules().is_empty());
    }

    #[test]
    fn should_ignore_dead_links_when_rule_dropped() {
        let mut registry = Registry::new();
        let probe = Arc::new(Probe::new("probe"));
        registry.insert(probe.clone()).unwrap();
        let rule = watching_rule(&registry, "value");
        drop(rule);
        assert!(probe.core().rules().is_empty());
        probe.set_current(2.0);
    }

    #[test]
    fn should_record_telemetry_and_notify_battery() {
        let mut registry = Registry::new();
        let probe = Arc::new(Probe::new("probe"));
        registry.insert(probe.clone()).unwrap();
        let rule = watching_rule(&registry, "battery");

        probe
            .core()
            .record_telemetry(&serde_json::json!({"battery": 87, "linkquality": 120}));

        let status = probe.status();
        assert_eq!(status.battery, Some(87));
        assert_eq!(status.link_quality, Some(120));
        assert_eq!(probe.trigger_value("battery"), Some(Value::Int(87)));
        assert!(rule.check_triggers(now()));
    }

    #[test]
    fn should_replay_step_when_called_twice_in_same_tick() {
        let core = DeviceCore::new(DeviceInfo::new("probe", "probe"));
        let mut calls = 0;
        assert_eq!(core.once_per_tick(1, || { calls += 1; Some(1.0) }), Some(1.0));
        assert_eq!(core.once_per_tick(1, || { calls += 1; Some(2.0) }), Some(1.0));
        assert_eq!(core.once_per_tick(2, || { calls += 1; None }), None);
        assert_eq!(calls, 2);
    }

    #[test]
    fn should_do_nothing_through_default_hooks() {
        let probe = Probe::new("probe");
        probe.set_current(4.0);

        assert_eq!(probe.update_value(1), None);
        assert!(probe.publish_value(&crate::ports::NullTransport).is_ok());
        assert!(probe.poll_value(&crate::ports::NullTransport).is_ok());
        probe.handle_state(br#"{"value":9}"#);
        assert_eq!(probe.follow_up_request(now()), None);
        probe.clear_trigger("value");
        assert!((probe.current() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn should_use_topic_as_state_topic_when_not_overridden() {
        let config = DeviceConfig::new("light", "desk").with_topic("zigbee2mqtt/desk");
        let info = DeviceInfo::from_config(&config);
        assert_eq!(info.state_topic.as_deref(), Some("zigbee2mqtt/desk"));
        assert_eq!(info.label, "desk");
        assert_eq!(info.persistent, vec!["battery"]);

        let info = DeviceInfo::from_config(&DeviceConfig::new("group", "living"));
        assert_eq!(info.state_topic, None);
    }
}
