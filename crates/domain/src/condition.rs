//! Condition: an operator, a configured value and an optional delay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::time::{Timestamp, elapsed_at_least};
use crate::value::{CoercionError, Value, coerce};

/// Comparison operator of a trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Compare an observed value against a configured target.
    ///
    /// Both sides are first coerced with [`coerce`]. Ordering operators only
    /// accept numeric pairs.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] when the values cannot be coerced, or when
    /// an ordering operator is applied to non-numeric values.
    pub fn apply(self, observed: &Value, target: &Value) -> Result<bool, CoercionError> {
        let (left, right) = coerce(observed, target)?;
        match self {
            Self::Eq => Ok(left == right),
            Self::Ne => Ok(left != right),
            Self::Gt | Self::Ge | Self::Lt | Self::Le => {
                let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
                    return Err(CoercionError::NotOrderable {
                        operator: self.as_str(),
                        observed: left.kind(),
                        target: right.kind(),
                    });
                };
                Ok(match self {
                    Self::Gt => left > right,
                    Self::Ge => left >= right,
                    Self::Lt => left < right,
                    _ => left <= right,
                })
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised operator token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operator `{0}`")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" | "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            other => Err(UnknownOperator(other.to_string())),
        }
    }
}

/// The predicate part of a trigger.
///
/// The observed side (last value and when it changed) is owned by the
/// runtime trigger and passed in on evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: Operator,
    pub value: Value,
    /// Seconds the observed value must have been stable before it counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl Condition {
    #[must_use]
    pub fn new(operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            operator,
            value: value.into(),
            delay: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.delay = Some(seconds);
        self
    }

    /// Evaluate against the last observation.
    ///
    /// Nothing observed yet, or a delay that has not elapsed since
    /// `last_changed`, evaluates to `false`.
    ///
    /// # Errors
    ///
    /// Propagates the [`CoercionError`] of [`Operator::apply`].
    pub fn evaluate(
        &self,
        last_value: Option<&Value>,
        last_changed: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<bool, CoercionError> {
        if let Some(delay) = self.delay {
            match last_changed {
                Some(changed) if elapsed_at_least(changed, now, delay) => {}
                _ => return Ok(false),
            }
        }
        let Some(observed) = last_value else {
            return Ok(false);
        };
        self.operator.apply(observed, &self.value)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.value)?;
        if let Some(delay) = self.delay {
            write!(f, " for {delay}s")?;
        }
        Ok(())
    }
}
