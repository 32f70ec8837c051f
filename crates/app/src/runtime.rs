//! The runtime: registry, rules and command queue behind one handle.
//!
//! Built once at startup and cloned into every adapter that needs it.
//! Building it also yields the two long-running [`Workers`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use glowhub_domain::config::{ReceiverConfig, RuleConfig};
use glowhub_domain::id::RuleId;
use glowhub_domain::request::SwitchRequest;
use glowhub_domain::status::DeviceStatus;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command_queue::{self, CommandQueue, DEFAULT_CAPACITY, Dispatcher, QueueError};
use crate::ports::Transport;
use crate::registry::Registry;
use crate::rule::{Rule, RuleError, RuleSet};
use crate::scheduler::{DEFAULT_CYCLE_LENGTH, Scheduler};

/// Tunables of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cycle_length: Duration,
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cycle_length: DEFAULT_CYCLE_LENGTH,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Shared handle on the running system.
#[derive(Clone)]
pub struct Runtime {
    registry: Arc<Registry>,
    rules: Arc<RuleSet>,
    queue: CommandQueue,
}

/// The dispatcher and scheduler, ready to be spawned.
pub struct Workers {
    pub dispatcher: Dispatcher,
    pub scheduler: Scheduler,
}

impl Workers {
    /// Spawn both loops on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
        (
            tokio::spawn(self.dispatcher.run()),
            tokio::spawn(self.scheduler.run()),
        )
    }
}

impl Runtime {
    #[must_use]
    pub fn new(
        registry: Registry,
        config: RuntimeConfig,
        transport: Arc<dyn Transport>,
    ) -> (Self, Workers) {
        let registry = Arc::new(registry);
        let rules = Arc::new(RuleSet::new());
        let (queue, receiver) = command_queue::bounded(config.queue_capacity);
        let workers = Workers {
            dispatcher: Dispatcher::new(registry.clone(), receiver),
            scheduler: Scheduler::new(
                registry.clone(),
                rules.clone(),
                queue.clone(),
                transport,
                config.cycle_length,
            ),
        };
        (
            Self {
                registry,
                rules,
                queue,
            },
            workers,
        )
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Build and activate configured rules. Rules that cannot be built are
    /// logged and skipped; returns how many were activated.
    pub fn load_rules(&self, configs: &[RuleConfig]) -> usize {
        configs
            .iter()
            .filter(|config| match self.add_rule(config) {
                Ok(_) => true,
                Err(err) => {
                    warn!(rule = %config.name, error = %err, "rule skipped");
                    false
                }
            })
            .count()
    }

    /// # Errors
    ///
    /// Returns [`RuleError`] when the rule references unknown devices or
    /// has no receivers.
    pub fn add_rule(&self, config: &RuleConfig) -> Result<RuleId, RuleError> {
        let rule = self.rules.add(Rule::from_config(config, &self.registry)?);
        info!(rule = %rule, "rule active");
        Ok(rule.id())
    }

    pub fn remove_rule(&self, id: RuleId) -> bool {
        self.rules.remove(id).is_some()
    }

    /// Active rules.
    #[must_use]
    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules.snapshot()
    }

    /// Queue a command for the dispatcher, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] when the dispatcher has stopped.
    pub async fn submit(&self, request: SwitchRequest) -> Result<(), QueueError> {
        self.queue.submit(request).await
    }

    /// Fire `receivers` once, `delay` from now.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::DelayOutOfRange`] for delays the calendar cannot
    /// represent; otherwise see [`schedule_at`](Self::schedule_at).
    pub fn schedule_once(
        &self,
        receivers: Vec<ReceiverConfig>,
        delay: Duration,
    ) -> Result<RuleId, RuleError> {
        let clock = self.registry.clock().ok_or(RuleError::NoClock)?;
        let delta = TimeDelta::from_std(delay)
            .map_err(|_| RuleError::DelayOutOfRange(delay.as_secs()))?;
        let at = clock
            .now()
            .checked_add_signed(delta)
            .ok_or(RuleError::DelayOutOfRange(delay.as_secs()))?;
        self.schedule_at(receivers, at)
    }

    /// Fire `receivers` once when the local clock reads `at`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::NoClock`] without a calendar device, or the
    /// construction error of the synthetic rule.
    pub fn schedule_at(
        &self,
        receivers: Vec<ReceiverConfig>,
        at: NaiveDateTime,
    ) -> Result<RuleId, RuleError> {
        let clock = self.registry.clock().ok_or(RuleError::NoClock)?;
        let config = RuleConfig {
            name: format!("once at {}", at.format("%Y-%m-%d %H:%M:%S")),
            triggers: clock.triggers_at(at),
            receivers,
            single_use: true,
        };
        self.add_rule(&config)
    }

    /// Status of every device.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DeviceStatus> {
        self.registry.snapshot()
    }
}
