//! HTTP error response mapping.

use std::error::Error;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use glowhub_app::command_queue::QueueError;
use glowhub_app::rule::RuleError;
use glowhub_domain::error::{GlowhubError, NotFoundError, ValidationError};
use serde::Serialize;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors a handler can return, each mapped to a status code.
#[derive(Debug)]
pub enum ApiError {
    Domain(GlowhubError),
    Rule(RuleError),
    Queue(QueueError),
}

impl From<GlowhubError> for ApiError {
    fn from(err: GlowhubError) -> Self {
        Self::Domain(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<NotFoundError> for ApiError {
    fn from(err: NotFoundError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        Self::Rule(err)
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Domain(GlowhubError::NotFound(_)) | Self::Rule(RuleError::UnknownDevice { .. }) => {
                StatusCode::NOT_FOUND
            }
            Self::Domain(_) | Self::Rule(RuleError::Invalid(_) | RuleError::DelayOutOfRange(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Rule(RuleError::NoClock) | Self::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Domain(err) => describe(err),
            Self::Rule(err) => describe(err),
            Self::Queue(err) => {
                tracing::error!(error = %err, "command queue unavailable");
                describe(err)
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// `err` followed by its sources, `: ` separated.
fn describe(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
