//! Rule listing, one-off scheduling and removal.

use std::str::FromStr;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use glowhub_app::rule::RuleError;
use glowhub_app::rule::receiver::DURATION_KEY;
use glowhub_domain::config::ReceiverConfig;
use glowhub_domain::error::{NotFoundError, ValidationError};
use glowhub_domain::id::RuleId;
use glowhub_domain::request::{DEFAULT_KEY, deserialize_loose_string};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Device kind that also receives a short fade with a scheduled value.
const LIGHT: &str = "light";

/// One active rule.
#[derive(Debug, Serialize)]
pub struct RuleSummary {
    pub id: RuleId,
    pub name: String,
    /// Human readable triggers and receivers.
    pub description: String,
    pub single_use: bool,
}

/// Request body for scheduling a one-off command.
#[derive(Debug, Deserialize)]
pub struct ScheduleOnceRequest {
    pub device: String,
    #[serde(default)]
    pub key: String,
    #[serde(deserialize_with = "deserialize_loose_string")]
    pub value: String,
    #[serde(rename = "in")]
    pub delay: u64,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "seconds".to_string()
}

#[derive(Debug, Serialize)]
pub struct Scheduled {
    pub id: RuleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3600,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Ok(Self::Seconds),
            "m" | "min" | "minute" | "minutes" => Ok(Self::Minutes),
            "h" | "hour" | "hours" => Ok(Self::Hours),
            _ => Err(ValidationError::UnknownTimeUnit(s.to_string())),
        }
    }
}

/// Possible responses from the list endpoint.
pub enum ListResponse {
    Ok(Json<Vec<RuleSummary>>),
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// Possible responses from the schedule endpoint.
pub enum ScheduleResponse {
    Created(Json<Scheduled>),
}

impl IntoResponse for ScheduleResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Created(json) => (StatusCode::CREATED, json).into_response(),
        }
    }
}

/// Possible responses from the delete endpoint.
pub enum DeleteResponse {
    NoContent,
}

impl IntoResponse for DeleteResponse {
    fn into_response(self) -> Response {
        match self {
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/rules`: every active rule.
pub async fn list(State(state): State<AppState>) -> ListResponse {
    let rules = state
        .runtime
        .rules()
        .iter()
        .map(|rule| RuleSummary {
            id: rule.id(),
            name: rule.name().to_string(),
            description: rule.to_string(),
            single_use: rule.single_use(),
        })
        .collect();
    ListResponse::Ok(Json(rules))
}

/// `POST /api/rules/once`: send `value` to `device` after the given delay.
pub async fn schedule_once(
    State(state): State<AppState>,
    Json(req): Json<ScheduleOnceRequest>,
) -> Result<ScheduleResponse, ApiError> {
    let unit = TimeUnit::from_str(&req.unit)?;
    let seconds = req
        .delay
        .checked_mul(unit.seconds())
        .ok_or(RuleError::DelayOutOfRange(req.delay))?;
    let key = if req.key.is_empty() {
        DEFAULT_KEY
    } else {
        req.key.as_str()
    };

    let registry = state.runtime.registry();
    let mut receivers = Vec::new();
    for name in req.device.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let device = registry.get(name).ok_or_else(|| NotFoundError {
            entity: "device",
            id: name.to_string(),
        })?;
        receivers.push(ReceiverConfig::new(name, key, req.value.as_str()));
        if device.kind() == LIGHT {
            receivers.push(ReceiverConfig::new(name, DURATION_KEY, "1"));
        }
    }
    if receivers.is_empty() {
        return Err(ValidationError::EmptyName.into());
    }

    let id = state
        .runtime
        .schedule_once(receivers, Duration::from_secs(seconds))?;
    info!(rule = %id, device = %req.device, seconds, "one-off command scheduled");
    Ok(ScheduleResponse::Created(Json(Scheduled { id })))
}

/// `DELETE /api/rules/{id}`: detach and drop a rule.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<DeleteResponse, ApiError> {
    let not_found = || NotFoundError {
        entity: "rule",
        id: id.clone(),
    };
    let rule_id = RuleId::from_str(&id).map_err(|_| not_found())?;
    if !state.runtime.remove_rule(rule_id) {
        return Err(not_found().into());
    }
    info!(rule = %rule_id, "rule removed");
    Ok(DeleteResponse::NoContent)
}
