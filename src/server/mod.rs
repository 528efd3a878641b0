//! HTTP server module.
//!
//! Serves random images from the prebuilt directory index over a small
//! axum API.

pub mod context;
pub mod routes;

pub use context::{AppState, SharedState, WalkSummary};
pub use routes::{build_router, serve, X_CREATION_DATE};
