//! Calendar device: exposes the local date and time as rule triggers.

use std::collections::BTreeMap;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use glowhub_domain::condition::{Condition, Operator};
use glowhub_domain::config::TriggerConfig;
use glowhub_domain::request::{ParseValueError, SwitchRequest};
use glowhub_domain::value::Value;
use parking_lot::RwLock;

use crate::device::{Device, DeviceCore, DeviceInfo};

/// Registry name of the clock.
pub const CLOCK_NAME: &str = "time";

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAY: &str = "day";
pub const HOUR: &str = "hour";
pub const MINUTE: &str = "minute";
pub const SECOND: &str = "second";
/// Days since Sunday, Sunday being 0.
pub const WEEKDAY: &str = "weekday";

const FIELDS: [&str; 7] = [YEAR, MONTH, DAY, HOUR, MINUTE, SECOND, WEEKDAY];

/// Fields that are always current. `minute` and `second` are not, so a rule
/// matching on them fires once per match instead of on every tick.
const PERSISTENT: [&str; 5] = [YEAR, MONTH, DAY, HOUR, WEEKDAY];

type TimeSource = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The hidden `time` device.
pub struct Clock {
    core: DeviceCore,
    calendar: RwLock<BTreeMap<&'static str, i64>>,
    source: TimeSource,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// A clock following the local system time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_time_source(|| Local::now().naive_local())
    }

    /// A clock reading its time from `source` on every tick.
    #[must_use]
    pub fn with_time_source(source: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        let info = DeviceInfo::new(CLOCK_NAME, CLOCK_NAME)
            .hidden(true)
            .with_triggers(FIELDS)
            .with_persistent(PERSISTENT);
        Self {
            core: DeviceCore::new(info),
            calendar: RwLock::new(BTreeMap::new()),
            source: Box::new(source),
        }
    }

    /// Current local time as seen by this clock.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        (self.source)()
    }

    /// Record the calendar at `at` and notify rules of every changed field.
    pub fn observe(&self, at: NaiveDateTime) {
        let fields = calendar_fields(at);
        let changed: Vec<(&'static str, i64)> = {
            let mut calendar = self.calendar.write();
            fields
                .into_iter()
                .filter(|(key, value)| calendar.insert(*key, *value) != Some(*value))
                .collect()
        };
        for (key, value) in changed {
            self.core.notify(key, Value::Int(value));
        }
    }

    /// Equality triggers matching the exact second `at`.
    #[must_use]
    pub fn triggers_at(&self, at: NaiveDateTime) -> Vec<TriggerConfig> {
        calendar_fields(at)
            .into_iter()
            .filter(|(key, _)| *key != WEEKDAY)
            .map(|(key, value)| TriggerConfig::new(CLOCK_NAME, key, Condition::new(Operator::Eq, value)))
            .collect()
    }
}

fn calendar_fields(at: NaiveDateTime) -> [(&'static str, i64); 7] {
    [
        (YEAR, i64::from(at.year())),
        (MONTH, i64::from(at.month())),
        (DAY, i64::from(at.day())),
        (HOUR, i64::from(at.hour())),
        (MINUTE, i64::from(at.minute())),
        (SECOND, i64::from(at.second())),
        (WEEKDAY, i64::from(at.weekday().num_days_from_sunday())),
    ]
}

impl Device for Clock {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn process_request(&self, request: &SwitchRequest) -> Result<(), ParseValueError> {
        Err(ParseValueError::new(CLOCK_NAME, request))
    }

    fn update_value(&self, tick: u64) -> Option<f64> {
        self.core.once_per_tick(tick, || {
            self.observe(self.now());
            None
        })
    }

    /// Every calendar field is current, even the ones cleared after firing.
    fn armed_value(&self, key: &str) -> Option<Value> {
        self.trigger_value(key)
    }

    fn trigger_value(&self, key: &str) -> Option<Value> {
        self.calendar
            .read()
            .get(key)
            .copied()
            .map(Value::Int)
            .or_else(|| self.core.trigger_value(key))
    }
}
