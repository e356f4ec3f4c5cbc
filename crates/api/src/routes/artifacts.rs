//! Route definitions for the `/artifacts` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::artifacts;
use crate::state::AppState;

/// Routes mounted at `/artifacts`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(artifacts::register_artifact))
}
