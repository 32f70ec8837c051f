//! Shared application state for axum handlers.

use glowhub_app::runtime::Runtime;

/// State shared across all handlers. Cloning only clones handles.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Runtime,
}

impl AppState {
    #[must_use]
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }
}
