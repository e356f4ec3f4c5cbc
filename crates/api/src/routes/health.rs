use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Version of the loaded assumption rule table.
    pub rule_table_version: String,
    /// Pipeline stages in run order.
    pub stages: Vec<&'static str>,
    pub active_runs: usize,
    pub open_channels: usize,
}

/// GET /health -- returns service liveness.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rule_table_version: state.jobs.rule_table_version().to_string(),
        stages: state.jobs.stage_names(),
        active_runs: state.jobs.active_runs().await,
        open_channels: state.jobs.open_channels().await,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
