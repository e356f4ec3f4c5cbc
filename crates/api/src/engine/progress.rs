//! Stage milestone handler.
//!
//! Translates pipeline milestones into job record updates and
//! `agent_progress` events on the job's progress channel.

use async_trait::async_trait;
use modporter_core::error::CoreError;
use modporter_core::types::JobId;
use modporter_db::models::job::Job;
use modporter_db::models::status::JobStatus;
use modporter_events::{EventType, ProgressUpdate};
use modporter_pipeline::ProgressSink;

use super::manager::JobManager;

impl JobManager {
    /// Load, mutate and store the job record, then publish the update.
    ///
    /// The record is written before the event so a poll is never behind an
    /// event a subscriber already holds.
    async fn record_milestone(
        &self,
        job_id: JobId,
        mutate: impl FnOnce(&mut Job) -> Result<(), CoreError> + Send,
        update: ProgressUpdate,
    ) -> Result<(), CoreError> {
        let mut job = self.get_status(job_id).await?;
        mutate(&mut job)?;
        self.jobs.update(&job).await?;
        let update = update
            .with_status(job.status.as_str())
            .with_progress(job.progress);
        self.publish(&job, EventType::AgentProgress, update).await;
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for JobManager {
    async fn stage_started(
        &self,
        job_id: JobId,
        stage: &'static str,
        status: JobStatus,
        progress: u8,
    ) {
        let message = format!("{stage} started");
        let update = ProgressUpdate::new()
            .with_agent(stage)
            .with_message(message.clone());
        let result = self
            .record_milestone(
                job_id,
                move |job| {
                    job.begin_stage(stage, status, message.clone())?;
                    job.advance(progress, message)
                },
                update,
            )
            .await;
        if let Err(e) = result {
            tracing::error!(%job_id, stage, error = %e, "Failed to record stage start");
        }
    }

    async fn stage_finished(
        &self,
        job_id: JobId,
        stage: &'static str,
        progress: u8,
        message: &str,
        output: &serde_json::Value,
    ) {
        let message = message.to_string();
        let update = ProgressUpdate::new()
            .with_agent(stage)
            .with_message(message.clone())
            .with_details(output.clone());
        let result = self
            .record_milestone(job_id, move |job| job.advance(progress, message), update)
            .await;
        if let Err(e) = result {
            tracing::error!(%job_id, stage, error = %e, "Failed to record stage result");
        }
    }
}
