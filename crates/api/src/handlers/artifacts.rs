//! Handlers for the `/artifacts` resource.
//!
//! Upload handling and bytecode extraction happen upstream; this endpoint
//! registers the extracted description so conversions can reference it.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use modporter_core::artifact::ModArtifact;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RegisteredArtifact {
    pub file_id: String,
}

/// POST /api/v1/artifacts
///
/// Register an extracted mod description. Returns 201 with its `file_id`.
pub async fn register_artifact(
    State(state): State<AppState>,
    payload: Result<Json<ModArtifact>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(artifact) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let mod_id = artifact.mod_id.clone();
    let file_id = state.jobs.register_artifact(artifact).await?;

    tracing::info!(file_id = %file_id, mod_id = %mod_id, "Artifact registered");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RegisteredArtifact { file_id },
        }),
    ))
}
