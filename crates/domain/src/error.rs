//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`GlowhubError`] via `#[from]` where it crosses a boundary.

use crate::request::ParseValueError;
use crate::value::CoercionError;

/// Top-level domain error.
#[derive(Debug, thiserror::Error)]
pub enum GlowhubError {
    #[error("validation error")]
    Validation(#[from] ValidationError),

    #[error("not found")]
    NotFound(#[from] NotFoundError),

    #[error("values are not comparable")]
    Coercion(#[from] CoercionError),

    #[error("invalid request value")]
    ParseValue(#[from] ParseValueError),
}

/// A configuration entry or request violates a domain invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("device name `{0}` is already registered")]
    DuplicateName(String),

    #[error("unknown device type `{0}`")]
    UnknownDeviceType(String),

    #[error("device `{device}` is missing option `{option}`")]
    MissingOption {
        device: String,
        option: &'static str,
    },

    #[error("device `{device}` has min {min} above max {max}")]
    InvertedBounds { device: String, min: f64, max: f64 },

    #[error("unknown time unit `{0}`")]
    UnknownTimeUnit(String),

    #[error("rule has no receivers")]
    NoReceivers,
}

/// A referenced entity does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} `{id}` not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}
