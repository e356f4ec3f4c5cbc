//! Route definitions for the `/conversions` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::conversions;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/conversions`.
///
/// ```text
/// GET    /                -> list_conversions
/// POST   /                -> submit_conversion
/// GET    /{id}            -> get_conversion
/// DELETE /{id}            -> delete_conversion
/// GET    /{id}/poll       -> poll_conversion
/// GET    /{id}/report     -> get_report
/// POST   /{id}/cancel     -> cancel_conversion
/// POST   /{id}/retry      -> retry_conversion
/// GET    /{id}/ws         -> progress_ws
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(conversions::list_conversions).post(conversions::submit_conversion),
        )
        .route(
            "/{id}",
            get(conversions::get_conversion).delete(conversions::delete_conversion),
        )
        .route("/{id}/poll", get(conversions::poll_conversion))
        .route("/{id}/report", get(conversions::get_report))
        .route("/{id}/cancel", post(conversions::cancel_conversion))
        .route("/{id}/retry", post(conversions::retry_conversion))
        .route("/{id}/ws", get(ws::progress_ws))
}
