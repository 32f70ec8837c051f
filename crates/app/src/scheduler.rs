//! Fixed-period control loop.
//!
//! Every tick, in order:
//! 1. step every device and publish the ones that changed
//! 2. collect follow-up requests from devices (motion timeouts, thermostats)
//! 3. evaluate every rule against the post-update values
//! 4. fire matching rules, then retire single-use rules or re-arm the others
//! 5. enqueue everything collected
//!
//! Each device and rule is isolated: a panic or transport error is logged
//! and the tick moves on to the next entity.

use std::sync::Arc;
use std::time::Duration;

use glowhub_domain::id::RuleId;
use glowhub_domain::request::SwitchRequest;
use glowhub_domain::time::{Timestamp, now};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::command_queue::{CommandQueue, QueueError};
use crate::isolate::isolate;
use crate::ports::Transport;
use crate::registry::Registry;
use crate::rule::RuleSet;

/// Default scheduler period.
pub const DEFAULT_CYCLE_LENGTH: Duration = Duration::from_millis(200);

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Devices whose value changed, with the new value.
    pub changed: Vec<(String, f64)>,
    pub fired: Vec<RuleId>,
    /// Requests handed to the command queue.
    pub enqueued: usize,
}

pub struct Scheduler {
    registry: Arc<Registry>,
    rules: Arc<RuleSet>,
    queue: CommandQueue,
    transport: Arc<dyn Transport>,
    cycle_length: Duration,
    tick: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        registry: Arc<Registry>,
        rules: Arc<RuleSet>,
        queue: CommandQueue,
        transport: Arc<dyn Transport>,
        cycle_length: Duration,
    ) -> Self {
        Self {
            registry,
            rules,
            queue,
            transport,
            cycle_length,
            tick: 0,
        }
    }

    /// Run one cycle as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the dispatcher is gone, in which
    /// case the collected requests are lost.
    pub async fn tick(&mut self, now: Timestamp) -> Result<TickReport, QueueError> {
        self.tick = self.tick.wrapping_add(1);
        let tick = self.tick;
        let mut report = TickReport::default();
        let mut requests: Vec<SwitchRequest> = Vec::new();

        for (name, device) in self.registry.iter() {
            let Some(Some(value)) = isolate("update_value", name, || device.update_value(tick)) else {
                continue;
            };
            report.changed.push((name.to_string(), value));
            match isolate("publish_value", name, || device.publish_value(self.transport.as_ref())) {
                Some(Err(err)) => warn!(device = name, error = %err, "publish failed"),
                Some(Ok(())) | None => {}
            }
        }

        for (name, device) in self.registry.iter() {
            if let Some(Some(request)) = isolate("follow_up_request", name, || device.follow_up_request(now)) {
                debug!(device = name, request = %request, "follow-up request");
                requests.push(request);
            }
        }

        for rule in self.rules.snapshot() {
            let label = rule.id().to_string();
            let fired = isolate("check_triggers", &label, || rule.check_triggers(now)).unwrap_or(false);
            if !fired {
                continue;
            }
            info!(rule = %rule.name(), id = %rule.id(), "rule fired");
            report.fired.push(rule.id());
            if let Some(fired) = isolate("fire", &label, || rule.fire()) {
                requests.extend(fired);
            }
            if rule.single_use() {
                self.rules.remove(rule.id());
            } else {
                isolate("clear_triggers", &label, || rule.clear_triggers());
            }
        }

        for request in requests {
            self.queue.submit(request).await?;
            report.enqueued += 1;
        }
        Ok(report)
    }

    /// Tick every cycle until the command queue closes.
    pub async fn run(mut self) {
        info!(cycle = ?self.cycle_length, devices = self.registry.len(), "scheduler started");
        let mut interval = tokio::time::interval(self.cycle_length);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = self.tick(now()).await {
                warn!(error = %err, "scheduler stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glowhub_domain::condition::{Condition, Operator};
    use glowhub_domain::config::{ReceiverConfig, RuleConfig, TriggerConfig};
    use glowhub_domain::request::ParseValueError;
    use parking_lot::Mutex;

    use super::*;
    use crate::command_queue::{CommandReceiver, bounded};
    use crate::device::{Device, DeviceCore, DeviceInfo};
    use crate::dimmable::Dimmable;
    use crate::ports::TransportError;
    use crate::rule::Rule;

    #[derive(Default)]
    struct SpyTransport {
        published: Mutex<Vec<(String, String)>>,
    }

    impl Transport for SpyTransport {
        fn publish(&self, topic: &str, payload: String) -> Result<(), TransportError> {
            self.published.lock().push((topic.to_string(), payload));
            Ok(())
        }
    }

    /// Publishes its value on `name`.
    struct Lamp {
        dimmable: Dimmable,
    }

    impl Device for Lamp {
        fn core(&self) -> &DeviceCore {
            self.dimmable.core()
        }

        fn min(&self) -> f64 {
            0.0
        }

        fn max(&self) -> f64 {
            100.0
        }

        fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
            self.dimmable.process_request(request)
        }

        fn update_value(&self, tick: u64) -> Option<f64> {
            self.dimmable.update_value(tick)
        }

        fn publish_value(&self, transport: &dyn Transport) -> Result<(), TransportError> {
            transport.publish(self.name(), self.current().to_string())
        }
    }

    struct Broken {
        core: DeviceCore,
    }

    impl Device for Broken {
        fn core(&self) -> &DeviceCore {
            &self.core
        }

        fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
            Err(ParseValueError::new(self.name(), request))
        }

        fn update_value(&self, _tick: u64) -> Option<f64> {
            panic!("broken driver");
        }
    }

    fn lamp(name: &str) -> Arc<Lamp> {
        Arc::new(Lamp {
            dimmable: Dimmable::new(
                DeviceInfo::new(name, "light").with_receivers(["value"]),
                0.0,
                100.0,
                DEFAULT_CYCLE_LENGTH,
            ),
        })
    }

    struct Harness {
        scheduler: Scheduler,
        receiver: CommandReceiver,
        transport: Arc<SpyTransport>,
        rules: Arc<RuleSet>,
        registry: Arc<Registry>,
    }

    fn harness(registry: Registry) -> Harness {
        let registry = Arc::new(registry);
        let rules = Arc::new(RuleSet::new());
        let transport = Arc::new(SpyTransport::default());
        let (queue, receiver) = bounded(16);
        let scheduler = Scheduler::new(
            registry.clone(),
            rules.clone(),
            queue,
            transport.clone(),
            DEFAULT_CYCLE_LENGTH,
        );
        Harness {
            scheduler,
            receiver,
            transport,
            rules,
            registry,
        }
    }

    fn rule_on_desk(at_least: i64, single_use: bool) -> RuleConfig {
        RuleConfig {
            name: "follow".to_string(),
            triggers: vec![TriggerConfig::new(
                "desk",
                "value",
                Condition::new(Operator::Ge, at_least),
            )],
            receivers: vec![ReceiverConfig::new("hall", "value", "100")],
            single_use,
        }
    }

    #[tokio::test]
    async fn should_publish_only_changed_devices() {
        let desk = lamp("desk");
        let hall = lamp("hall");
        let mut registry = Registry::new();
        registry.insert(desk.clone()).unwrap();
        registry.insert(hall).unwrap();
        let mut h = harness(registry);

        desk.process_request(&SwitchRequest::new("desk", "40")).unwrap();
        let report = h.scheduler.tick(now()).await.unwrap();
        assert_eq!(report.changed, vec![("desk".to_string(), 40.0)]);
        assert_eq!(
            *h.transport.published.lock(),
            vec![("desk".to_string(), "40".to_string())]
        );

        let report = h.scheduler.tick(now()).await.unwrap();
        assert!(report.changed.is_empty());
        assert_eq!(h.transport.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn should_fire_rule_on_post_update_value() {
        let desk = lamp("desk");
        let mut registry = Registry::new();
        registry.insert(desk.clone()).unwrap();
        registry.insert(lamp("hall")).unwrap();
        let mut h = harness(registry);
        h.rules
            .add(Rule::from_config(&rule_on_desk(50, false), &h.registry).unwrap());

        desk.process_request(&SwitchRequest::new("desk", "60")).unwrap();
        let report = h.scheduler.tick(now()).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.enqueued, 1);
        let request = h.receiver.recv().await.unwrap();
        assert_eq!(request, SwitchRequest::new("hall", "100"));

        // cleared, and the desk value did not change again
        let report = h.scheduler.tick(now()).await.unwrap();
        assert!(report.fired.is_empty());
        assert_eq!(h.rules.len(), 1);
    }

    #[tokio::test]
    async fn should_remove_single_use_rule_after_firing() {
        let desk = lamp("desk");
        let mut registry = Registry::new();
        registry.insert(desk.clone()).unwrap();
        registry.insert(lamp("hall")).unwrap();
        let mut h = harness(registry);
        h.rules
            .add(Rule::from_config(&rule_on_desk(10, true), &h.registry).unwrap());
        assert_eq!(desk.core().rules().len(), 1);

        desk.process_request(&SwitchRequest::new("desk", "20")).unwrap();
        let report = h.scheduler.tick(now()).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        assert!(h.rules.is_empty());
        assert!(desk.core().rules().is_empty());

        desk.process_request(&SwitchRequest::new("desk", "30")).unwrap();
        let report = h.scheduler.tick(now()).await.unwrap();
        assert!(report.fired.is_empty());
    }

    #[tokio::test]
    async fn should_keep_ticking_when_a_device_panics() {
        let desk = lamp("desk");
        let mut registry = Registry::new();
        registry
            .insert(Arc::new(Broken {
                core: DeviceCore::new(DeviceInfo::new("a-broken", "plug")),
            }))
            .unwrap();
        registry.insert(desk.clone()).unwrap();
        let mut h = harness(registry);

        desk.process_request(&SwitchRequest::new("desk", "10")).unwrap();
        let report = h.scheduler.tick(now()).await.unwrap();
        assert_eq!(report.changed, vec![("desk".to_string(), 10.0)]);
    }

    #[tokio::test]
    async fn should_step_transition_once_per_tick() {
        let desk = lamp("desk");
        let mut registry = Registry::new();
        registry.insert(desk.clone()).unwrap();
        let mut h = harness(registry);

        desk.process_request(&SwitchRequest::new("desk", "100").with_duration(10))
            .unwrap();
        for _ in 0..50 {
            h.scheduler.tick(now()).await.unwrap();
        }
        assert_eq!(desk.current(), 100.0);
        assert!(h.scheduler.tick(now()).await.unwrap().changed.is_empty());
        assert_eq!(h.transport.published.lock().len(), 50);
    }

    #[tokio::test]
    async fn should_fail_when_queue_closed() {
        let desk = lamp("desk");
        let mut registry = Registry::new();
        registry.insert(desk.clone()).unwrap();
        registry.insert(lamp("hall")).unwrap();
        let Harness {
            mut scheduler,
            receiver,
            rules,
            registry,
            ..
        } = harness(registry);
        rules.add(Rule::from_config(&rule_on_desk(0, false), &registry).unwrap());
        drop(receiver);

        desk.process_request(&SwitchRequest::new("desk", "5")).unwrap();
        assert_eq!(scheduler.tick(now()).await, Err(QueueError::Closed));
    }
}
