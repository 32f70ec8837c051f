//! Dynamically typed values observed by rule triggers.
//!
//! Devices report booleans (occupancy), integers (calendar fields),
//! floats (brightness, temperature) and strings (button actions). Rules are
//! configured with a target of any of those kinds, so comparing the two goes
//! through [`coerce`], the one place where mixed types are reconciled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar value as observed on a device or configured on a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Short name of the variant, used in log lines and errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Numeric view of the value, `None` for bools and strings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(_) | Self::String(_) => None,
        }
    }

    /// Convert a JSON scalar, as found in inbound device payloads.
    ///
    /// Objects, arrays and `null` have no scalar meaning and yield `None`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(value) => Some(Self::Bool(*value)),
            serde_json::Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float)),
            serde_json::Value::String(value) => Some(Self::String(value.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Two values could not be brought to a common, comparable type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoercionError {
    #[error("cannot compare {observed} with {target}")]
    Incompatible {
        observed: &'static str,
        target: &'static str,
    },

    #[error("operator `{operator}` needs numeric operands, got {observed} and {target}")]
    NotOrderable {
        operator: &'static str,
        observed: &'static str,
        target: &'static str,
    },
}

/// Bring an observed value and a configured target to the same variant.
///
/// On success both returned values are of the same variant:
///
/// | observed  | target    | result                                             |
/// |-----------|-----------|----------------------------------------------------|
/// | same kind | same kind | unchanged                                          |
/// | int       | float     | both floats (and the other way round)              |
/// | numeric   | string    | string parsed as a number, else both as strings    |
/// | bool      | string    | string parsed as `true`/`false`, ignoring case     |
/// | otherwise |           | [`CoercionError::Incompatible`]                    |
///
/// The table is symmetric: a string observation against a numeric target
/// follows the same rule as a numeric observation against a string target.
///
/// # Errors
///
/// Returns [`CoercionError::Incompatible`] when no rule of the table applies.
pub fn coerce(observed: &Value, target: &Value) -> Result<(Value, Value), CoercionError> {
    use Value::{Bool, Float, Int, String};

    let incompatible = || CoercionError::Incompatible {
        observed: observed.kind(),
        target: target.kind(),
    };

    match (observed, target) {
        (Bool(_), Bool(_)) | (Int(_), Int(_)) | (Float(_), Float(_)) | (String(_), String(_)) => {
            Ok((observed.clone(), target.clone()))
        }
        (Int(_), Float(_)) | (Float(_), Int(_)) => match (observed.as_f64(), target.as_f64()) {
            (Some(left), Some(right)) => Ok((Float(left), Float(right))),
            _ => Err(incompatible()),
        },
        (Int(_) | Float(_), String(text)) => {
            let parsed = numeric_counterpart(observed, text);
            Ok(parsed.unwrap_or_else(|| (String(observed.to_string()), target.clone())))
        }
        (String(text), Int(_) | Float(_)) => {
            let parsed = numeric_counterpart(target, text).map(|(num, parsed)| (parsed, num));
            Ok(parsed.unwrap_or_else(|| (observed.clone(), String(target.to_string()))))
        }
        (Bool(_), String(text)) => parse_bool(text)
            .map(|parsed| (observed.clone(), Bool(parsed)))
            .ok_or_else(incompatible),
        (String(text), Bool(_)) => parse_bool(text)
            .map(|parsed| (Bool(parsed), target.clone()))
            .ok_or_else(incompatible),
        (Bool(_), Int(_) | Float(_)) | (Int(_) | Float(_), Bool(_)) => Err(incompatible()),
    }
}

/// Parse `text` as a number matching `number`, returning `(number, parsed)`
/// with both widened to floats when either side is fractional.
fn numeric_counterpart(number: &Value, text: &str) -> Option<(Value, Value)> {
    let text = text.trim();
    if let (Value::Int(value), Ok(parsed)) = (number, text.parse::<i64>()) {
        return Some((Value::Int(*value), Value::Int(parsed)));
    }
    let parsed = text.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((Value::Float(number.as_f64()?), Value::Float(parsed)))
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
