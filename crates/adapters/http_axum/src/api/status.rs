//! Device status snapshot.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use glowhub_domain::status::DeviceStatus;

use crate::state::AppState;

/// `GET /api/status`: every device, keyed by name.
pub async fn snapshot(State(state): State<AppState>) -> Json<BTreeMap<String, DeviceStatus>> {
    Json(state.runtime.snapshot())
}
