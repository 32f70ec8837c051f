//! Command intake.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use glowhub_domain::error::ValidationError;
use glowhub_domain::request::SwitchRequest;
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Acknowledgement for a queued command.
#[derive(Serialize)]
pub struct Accepted {
    pub message: &'static str,
    pub input: SwitchRequest,
}

/// Possible responses from the switch endpoint.
pub enum SubmitResponse {
    Accepted(Json<Accepted>),
}

impl IntoResponse for SubmitResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Accepted(json) => (StatusCode::ACCEPTED, json).into_response(),
        }
    }
}

/// `POST /api/switch`: queue a command, waiting while the queue is full.
///
/// Unknown device names are not an error here: the dispatcher logs and
/// drops them.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SwitchRequest>,
) -> Result<SubmitResponse, ApiError> {
    if request.targets().next().is_none() {
        return Err(ValidationError::EmptyName.into());
    }
    info!(request = %request, "command received");
    state.runtime.submit(request.clone()).await?;
    Ok(SubmitResponse::Accepted(Json(Accepted {
        message: "request queued",
        input: request,
    })))
}
