//! Job manager: owns job records and dispatches pipeline runs.
//!
//! Each run executes as its own Tokio task, tracked by a [`TaskTracker`] so
//! shutdown can wait for in-flight runs. While a run is active it is the
//! only writer of its job record; the manager applies the terminal
//! transition and publishes the terminal event when the run returns.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modporter_core::artifact::ModArtifact;
use modporter_core::assumptions::{RuleTable, SmartAssumptionEngine};
use modporter_core::error::CoreError;
use modporter_core::report::{ConversionOutcome, ConversionReport};
use modporter_core::types::{JobId, SequenceNumber};
use modporter_db::models::job::{Job, JobError, JobListQuery, SubmitConversion};
use modporter_db::models::status::JobStatus;
use modporter_db::{ArtifactRepo, JobRepo};
use modporter_events::{
    BroadcastError, EventType, PollSnapshot, ProgressBus, ProgressUpdate, Subscription,
};
use modporter_pipeline::stage::{StageError, STAGE_JAVA_ANALYZER};
use modporter_pipeline::{
    CancellationController, ConversionPipeline, PipelineOutcome, StageContext,
};
use tokio_util::task::TaskTracker;

pub struct JobManager {
    pub(crate) jobs: Arc<dyn JobRepo>,
    artifacts: Arc<dyn ArtifactRepo>,
    pub(crate) bus: Arc<ProgressBus>,
    cancellation: Arc<CancellationController>,
    pipeline: Arc<ConversionPipeline>,
    rules: Arc<RuleTable>,
    /// Jobs with a run in flight.
    active: Mutex<HashSet<JobId>>,
    tasks: TaskTracker,
}

impl JobManager {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        artifacts: Arc<dyn ArtifactRepo>,
        bus: Arc<ProgressBus>,
        pipeline: ConversionPipeline,
        rules: Arc<RuleTable>,
    ) -> Self {
        Self {
            jobs,
            artifacts,
            bus,
            cancellation: Arc::new(CancellationController::new()),
            pipeline: Arc::new(pipeline),
            rules,
            active: Mutex::new(HashSet::new()),
            tasks: TaskTracker::new(),
        }
    }

    pub fn rule_table_version(&self) -> &str {
        &self.rules.version
    }

    /// Stage names of the configured pipeline, in run order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }

    /// Runs currently holding a cancellation signal.
    pub async fn active_runs(&self) -> usize {
        self.cancellation.tracked().await
    }

    /// Progress channels still held by the broadcast service.
    pub async fn open_channels(&self) -> usize {
        self.bus.channel_count().await
    }

    /// Live subscribers on one job's progress channel.
    pub async fn subscriber_count(&self, job_id: JobId) -> usize {
        self.bus.subscriber_count(job_id).await
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Register an already-uploaded mod description and return its handle.
    pub async fn register_artifact(&self, artifact: ModArtifact) -> Result<String, CoreError> {
        artifact.validate()?;
        let file_id = self.artifacts.put_artifact(artifact).await?;
        Ok(file_id)
    }

    // -----------------------------------------------------------------------
    // Submission and dispatch
    // -----------------------------------------------------------------------

    /// Create a `PENDING` job and start its run in the background.
    pub async fn submit(self: &Arc<Self>, input: SubmitConversion) -> Result<Job, CoreError> {
        let file_id = input.validate()?.to_string();
        if self.artifacts.find_artifact(&file_id).await?.is_none() {
            return Err(CoreError::Validation(format!(
                "fileId '{file_id}' does not reference an uploaded artifact"
            )));
        }

        let job = Job::new(file_id, input.options);
        self.create_and_dispatch(job).await
    }

    /// Re-run a failed or cancelled job as a new job.
    pub async fn retry(self: &Arc<Self>, job_id: JobId) -> Result<Job, CoreError> {
        let original = self.get_status(job_id).await?;
        match original.status {
            JobStatus::Failed | JobStatus::Cancelled => {}
            JobStatus::Completed => {
                return Err(CoreError::Validation(format!(
                    "Job {job_id} completed successfully and cannot be retried"
                )))
            }
            status => {
                return Err(CoreError::Conflict(format!(
                    "Job {job_id} is still {status}; cancel it before retrying"
                )))
            }
        }

        let job = original.retry();
        tracing::info!(
            job_id = %job.job_id,
            retry_of = %job_id,
            attempt = job.attempt,
            "Retrying conversion",
        );
        self.create_and_dispatch(job).await
    }

    async fn create_and_dispatch(self: &Arc<Self>, job: Job) -> Result<Job, CoreError> {
        self.jobs.insert(&job).await?;
        self.bus
            .open(&job)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        self.dispatch(job.job_id).await?;

        tracing::info!(job_id = %job.job_id, file_id = %job.file_id, "Conversion submitted");
        Ok(job)
    }

    /// Start the run for an existing `PENDING` job.
    ///
    /// Rejected with `Conflict` while the job already has an active run or
    /// has left `PENDING`.
    pub async fn dispatch(self: &Arc<Self>, job_id: JobId) -> Result<(), CoreError> {
        let job = self.get_status(job_id).await?;
        if !self.mark_active(job_id) {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} already has an active run"
            )));
        }
        if job.status != JobStatus::Pending {
            self.clear_active(job_id);
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {} and cannot be started",
                job.status
            )));
        }

        self.cancellation.register(job_id).await;
        let manager = Arc::clone(self);
        self.tasks.spawn(async move {
            manager.drive(job).await;
        });
        Ok(())
    }

    fn mark_active(&self, job_id: JobId) -> bool {
        match self.active.lock() {
            Ok(mut active) => active.insert(job_id),
            Err(poisoned) => poisoned.into_inner().insert(job_id),
        }
    }

    fn clear_active(&self, job_id: JobId) {
        match self.active.lock() {
            Ok(mut active) => active.remove(&job_id),
            Err(poisoned) => poisoned.into_inner().remove(&job_id),
        };
    }

    /// Whether a run is in flight for the job.
    pub fn is_running(&self, job_id: JobId) -> bool {
        match self.active.lock() {
            Ok(active) => active.contains(&job_id),
            Err(poisoned) => poisoned.into_inner().contains(&job_id),
        }
    }

    /// Execute the pipeline for one job and record its outcome.
    async fn drive(&self, job: Job) {
        let job_id = job.job_id;
        let outcome = match self.stage_context(&job) {
            Ok(ctx) => self.pipeline.run(ctx, &self.cancellation, self).await,
            Err(e) => PipelineOutcome::Failed {
                stage: STAGE_JAVA_ANALYZER,
                error: StageError::AgentExecution(e.to_string()),
            },
        };

        self.finish(job_id, outcome).await;
        // Released only once the terminal event is logged, so a delete that
        // sees the run as finished cannot race the terminal publish.
        self.release(job_id).await;
    }

    /// Forget the run's cancellation signal and active marker.
    async fn release(&self, job_id: JobId) {
        self.cancellation.clear(job_id).await;
        self.clear_active(job_id);
    }

    fn stage_context(&self, job: &Job) -> Result<StageContext, CoreError> {
        let target = job.options.target()?;
        let engine = SmartAssumptionEngine::new(Arc::clone(&self.rules), target.capabilities());
        Ok(StageContext::new(
            job.job_id,
            job.file_id.clone(),
            job.options.clone(),
            target,
            Arc::clone(&self.artifacts),
            engine,
        ))
    }

    /// Apply the terminal transition and publish the terminal event.
    ///
    /// Storage failures never leave a run without its terminal event: a
    /// report that cannot be stored fails the job, and a record that cannot
    /// be written still has its terminal state published to the bus.
    async fn finish(&self, job_id: JobId, outcome: PipelineOutcome) {
        let mut job = match self.get_status(job_id).await {
            Ok(job) => job,
            Err(e) => match self.bus.poll(job_id, 0).await {
                Ok(snapshot) => {
                    tracing::error!(%job_id, error = %e, "Job record unreadable, using progress snapshot");
                    snapshot.job
                }
                Err(_) => {
                    tracing::error!(%job_id, error = %e, "Job record and progress channel both missing");
                    return;
                }
            },
        };

        let terminal = match outcome {
            PipelineOutcome::Completed {
                result_reference,
                report,
            } => self.completed(&mut job, result_reference, report).await,
            PipelineOutcome::Failed { stage, error } => failed(&mut job, stage, &error),
            PipelineOutcome::Cancelled { before_stage } => cancelled(&mut job, before_stage),
        };
        let Some((event_type, update)) = terminal else {
            return;
        };

        if let Err(e) = self.jobs.update(&job).await {
            tracing::error!(
                %job_id,
                status = %job.status,
                error = %e,
                "Terminal job state not stored",
            );
        }
        self.publish(&job, event_type, update).await;

        tracing::info!(
            %job_id,
            status = %job.status,
            progress = job.progress,
            "Conversion finished",
        );
    }

    async fn completed(
        &self,
        job: &mut Job,
        result_reference: String,
        report: ConversionReport,
    ) -> Option<(EventType, ProgressUpdate)> {
        let last_stage = job.stage.clone().unwrap_or_default();
        if let Err(e) = self.jobs.save_report(&report).await {
            tracing::error!(job_id = %job.job_id, error = %e, "Conversion report not stored");
            let error = StageError::Packaging(format!("Report could not be stored: {e}"));
            return failed(job, &last_stage, &error);
        }

        let message = match report.outcome {
            ConversionOutcome::Success => "Conversion completed".to_string(),
            ConversionOutcome::SuccessWithCompromises => format!(
                "Conversion completed with compromises: {} smart assumptions, {} excluded",
                report.summary.smart_assumption, report.summary.excluded
            ),
        };
        if let Err(e) = job.complete(result_reference.clone(), message.clone()) {
            return failed(job, &last_stage, &StageError::Packaging(e.to_string()));
        }

        let details = serde_json::json!({
            "result_reference": result_reference,
            "report": report,
        });
        Some((
            EventType::ConversionComplete,
            ProgressUpdate::new()
                .with_status(JobStatus::Completed.as_str())
                .with_progress(100)
                .with_message(message)
                .with_details(details),
        ))
    }

    /// Publish, logging instead of failing: delivery problems never affect
    /// the job itself.
    pub(crate) async fn publish(&self, job: &Job, event_type: EventType, update: ProgressUpdate) {
        if let Err(e) = self.bus.publish(job, event_type, update).await {
            tracing::warn!(
                job_id = %job.job_id,
                event_type = event_type.as_str(),
                error = %e,
                "Progress event not published",
            );
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_status(&self, job_id: JobId) -> Result<Job, CoreError> {
        self.jobs
            .find_by_id(job_id)
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    pub async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, CoreError> {
        Ok(self.jobs.list(query).await?)
    }

    /// Latest snapshot for clients without a live connection.
    pub async fn poll(
        &self,
        job_id: JobId,
        since: SequenceNumber,
    ) -> Result<PollSnapshot, CoreError> {
        match self.bus.poll(job_id, since).await {
            Ok(snapshot) => Ok(snapshot),
            Err(BroadcastError::UnknownJob(_)) => {
                let job = self.get_status(job_id).await?;
                let terminal = job.status.is_terminal();
                Ok(PollSnapshot {
                    job,
                    latest_sequence: 0,
                    has_updates: false,
                    terminal,
                })
            }
            Err(e) => Err(CoreError::Internal(e.to_string())),
        }
    }

    pub async fn subscribe(
        &self,
        job_id: JobId,
        since: Option<SequenceNumber>,
    ) -> Result<Subscription, CoreError> {
        self.bus.subscribe(job_id, since).await.map_err(|e| match e {
            BroadcastError::UnknownJob(id) => not_found(id),
            other => CoreError::Internal(other.to_string()),
        })
    }

    /// The conversion report of a completed job.
    pub async fn report(&self, job_id: JobId) -> Result<ConversionReport, CoreError> {
        let job = self.get_status(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is {}; reports exist only for completed conversions",
                job.status
            )));
        }
        self.jobs
            .find_report(job_id)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity: "ConversionReport",
                id: job_id.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Request cancellation. Idempotent; a no-op for terminal jobs.
    pub async fn cancel(&self, job_id: JobId) -> Result<Job, CoreError> {
        let job = self.get_status(job_id).await?;
        if job.status.is_terminal() {
            tracing::debug!(%job_id, status = %job.status, "Cancel ignored for terminal job");
            return Ok(job);
        }
        if self.cancellation.request_cancel(job_id).await {
            tracing::info!(%job_id, stage = ?job.stage, "Cancellation requested");
        }
        Ok(job)
    }

    /// Remove a terminal job together with its event log.
    pub async fn delete(&self, job_id: JobId) -> Result<(), CoreError> {
        let job = self.get_status(job_id).await?;
        if !job.status.is_terminal() || self.is_running(job_id) {
            return Err(CoreError::Conflict(format!(
                "Job {job_id} is still {}; cancel it before deleting",
                job.status
            )));
        }
        if !self.jobs.delete(job_id).await? {
            return Err(not_found(job_id));
        }
        self.bus.remove(job_id).await;
        self.cancellation.clear(job_id).await;
        tracing::info!(%job_id, "Conversion deleted");
        Ok(())
    }

    /// Signal every active run and wait up to `timeout` for them to finish.
    ///
    /// Returns `true` when all runs reached a terminal state in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let signalled = self.cancellation.cancel_all().await;
        self.tasks.close();
        tracing::info!(active_runs = signalled, "Waiting for conversion runs to stop");
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }
}

/// Fail the job at `stage`. `None` only if the job is already terminal.
fn failed(job: &mut Job, stage: &str, error: &StageError) -> Option<(EventType, ProgressUpdate)> {
    let kind = error.kind();
    if let Err(e) = job.fail(JobError {
        stage: stage.to_string(),
        kind,
        cause: error.to_string(),
    }) {
        tracing::error!(job_id = %job.job_id, error = %e, "Cannot fail job");
        return None;
    }
    Some((
        EventType::ConversionFailed,
        ProgressUpdate::new()
            .with_agent(stage)
            .with_status(JobStatus::Failed.as_str())
            .with_progress(job.progress)
            .with_message(job.message.clone())
            .with_details(serde_json::json!({
                "stage": stage,
                "error_type": kind,
                "cause": error.to_string(),
            })),
    ))
}

fn cancelled(
    job: &mut Job,
    before_stage: Option<&'static str>,
) -> Option<(EventType, ProgressUpdate)> {
    let message = match before_stage {
        Some(stage) => format!("Conversion cancelled before {stage}"),
        None => "Conversion cancelled after the final stage".to_string(),
    };
    if let Err(e) = job.cancel(message) {
        tracing::error!(job_id = %job.job_id, error = %e, "Cannot cancel job");
        return None;
    }
    Some((
        EventType::ConversionCancelled,
        ProgressUpdate::new()
            .with_status(JobStatus::Cancelled.as_str())
            .with_progress(job.progress)
            .with_message(job.message.clone())
            .with_details(serde_json::json!({ "before_stage": before_stage })),
    ))
}

fn not_found(job_id: JobId) -> CoreError {
    CoreError::NotFound {
        entity: "Job",
        id: job_id.to_string(),
    }
}
