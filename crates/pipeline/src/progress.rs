//! Milestone reporting from the pipeline to its owner.

use async_trait::async_trait;
use modporter_core::types::JobId;
use modporter_db::models::status::JobStatus;

/// Receives stage milestones as they happen.
///
/// The job manager implements this to update the job record and publish
/// `agent_progress` events. Terminal transitions are not reported here;
/// they follow from the [`PipelineOutcome`](crate::PipelineOutcome).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn stage_started(
        &self,
        job_id: JobId,
        stage: &'static str,
        status: JobStatus,
        progress: u8,
    );

    async fn stage_finished(
        &self,
        job_id: JobId,
        stage: &'static str,
        progress: u8,
        message: &str,
        output: &serde_json::Value,
    );
}
