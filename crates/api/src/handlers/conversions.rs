//! Handlers for the `/conversions` resource.
//!
//! Thin wrappers over [`JobManager`](crate::engine::JobManager): the
//! manager owns validation and lifecycle rules, handlers map its results
//! onto status codes and the `{ "data": ... }` envelope.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use modporter_core::types::{JobId, SequenceNumber};
use modporter_db::models::job::{JobListQuery, SubmitConversion};
use modporter_events::PollSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// `?since=N`: the last sequence number the client has seen.
#[derive(Debug, Default, Deserialize)]
pub struct SinceQuery {
    pub since: Option<SequenceNumber>,
}

/// Poll response: the snapshot plus the interval clients should poll at.
#[derive(Debug, Serialize)]
pub struct PollResponse {
    #[serde(flatten)]
    pub snapshot: PollSnapshot,
    pub poll_interval_ms: u64,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/conversions
///
/// Submit a conversion for an uploaded artifact. Returns 201 with the
/// created `PENDING` job; the run starts in the background.
pub async fn submit_conversion(
    State(state): State<AppState>,
    payload: Result<Json<SubmitConversion>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let job = state.jobs.submit(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/conversions
///
/// Newest first. Supports optional `status`, `limit` and `offset`.
pub async fn list_conversions(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.jobs.list(&params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get / poll / report
// ---------------------------------------------------------------------------

/// GET /api/v1/conversions/{id}
pub async fn get_conversion(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.get_status(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/conversions/{id}/poll?since=N
///
/// Fallback for clients without a live connection.
pub async fn poll_conversion(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Query(query): Query<SinceQuery>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .jobs
        .poll(job_id, query.since.unwrap_or(0))
        .await?;
    Ok(Json(DataResponse {
        data: PollResponse {
            snapshot,
            poll_interval_ms: state.config.status_poll_interval_ms,
        },
    }))
}

/// GET /api/v1/conversions/{id}/report
///
/// 409 unless the job completed.
pub async fn get_report(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let report = state.jobs.report(job_id).await?;
    Ok(Json(DataResponse { data: report }))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

/// POST /api/v1/conversions/{id}/cancel
///
/// Idempotent. Returns 202: the run stops at its next stage boundary.
pub async fn cancel_conversion(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.cancel(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// POST /api/v1/conversions/{id}/retry
///
/// Re-run a failed or cancelled job as a new job. Returns 201.
pub async fn retry_conversion(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.retry(job_id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// DELETE /api/v1/conversions/{id}
///
/// Returns 204, or 409 while the job is still running.
pub async fn delete_conversion(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state.jobs.delete(job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
