//! # glowhub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Accept commands (`POST /api/switch`) and hand them to the command
//!   queue, waiting while it is full
//! - Serve the device status snapshot (`GET /api/status`)
//! - List, schedule and remove rules (`/api/rules`)
//! - Map application errors into HTTP responses
//!
//! ## Dependency rule
//! Depends on `glowhub-app` (the [`Runtime`](glowhub_app::runtime::Runtime)
//! handle) and `glowhub-domain` (request and response types). Never leaks
//! axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;
