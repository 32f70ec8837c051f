//! JSON API handler modules.

#[allow(clippy::missing_errors_doc)]
pub mod rules;
#[allow(clippy::missing_errors_doc)]
pub mod status;
#[allow(clippy::missing_errors_doc)]
pub mod switch;

use axum::Router;
use axum::routing::{delete, get, post};

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/switch", post(switch::submit))
        .route("/status", get(status::snapshot))
        .route("/rules", get(rules::list))
        .route("/rules/once", post(rules::schedule_once))
        .route("/rules/{id}", delete(rules::remove))
}
