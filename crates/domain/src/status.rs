//! Public snapshot of a device, as served by the status endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub hidden: bool,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<Timestamp>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub receivers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<i64>,
    #[serde(
        default,
        rename = "linkquality",
        skip_serializing_if = "Option::is_none"
    )]
    pub link_quality: Option<i64>,
    /// Driver specific readings, such as sensor fields.
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, Value>,
}

/// JSON keys owned by the fixed fields of [`DeviceStatus`].
pub const RESERVED_KEYS: &[&str] = &[
    "type",
    "label",
    "hidden",
    "value",
    "target",
    "min",
    "max",
    "lastChanged",
    "triggers",
    "receivers",
    "battery",
    "linkquality",
];

impl DeviceStatus {
    /// Add a driver reading under `key`.
    ///
    /// Returns `false` and drops the reading when `key` is one of
    /// [`RESERVED_KEYS`], so the snapshot never carries a key twice.
    pub fn insert_extra(&mut self, key: &str, value: Value) -> bool {
        if RESERVED_KEYS.contains(&key) {
            return false;
        }
        self.extra.insert(key.to_string(), value);
        true
    }
}
