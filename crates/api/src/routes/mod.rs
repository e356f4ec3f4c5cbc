pub mod artifacts;
pub mod conversions;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /artifacts                          register artifact (POST)
///
/// /conversions                        list, submit
/// /conversions/{id}                   get, delete
/// /conversions/{id}/poll              polling snapshot
/// /conversions/{id}/report            conversion report
/// /conversions/{id}/cancel            cancel (POST)
/// /conversions/{id}/retry             retry (POST)
/// /conversions/{id}/ws                WebSocket progress stream
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/artifacts", artifacts::router())
        .nest("/conversions", conversions::router())
}
