//! Sequential stage runner.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use modporter_core::report::ConversionReport;

use crate::cancellation::CancellationController;
use crate::context::StageContext;
use crate::progress::ProgressSink;
use crate::stage::{Stage, StageError, STAGE_PACKAGING_AGENT};
use crate::stages::standard_stages;

/// Per-stage time bound used when a stage does not declare its own.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// How a run ended. Exactly one outcome per run.
#[derive(Debug)]
pub enum PipelineOutcome {
    Completed {
        result_reference: String,
        report: ConversionReport,
    },
    Failed {
        stage: &'static str,
        error: StageError,
    },
    /// Cancellation was observed at the boundary before `before_stage`, or
    /// after the last stage when `before_stage` is `None`.
    Cancelled { before_stage: Option<&'static str> },
}

pub struct ConversionPipeline {
    stages: Vec<Arc<dyn Stage>>,
    stage_timeout: Duration,
}

impl ConversionPipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>, stage_timeout: Duration) -> Self {
        Self {
            stages,
            stage_timeout,
        }
    }

    /// The six production stages.
    pub fn standard(stage_timeout: Duration) -> Self {
        Self::new(standard_stages(), stage_timeout)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order against `ctx`.
    ///
    /// Cancellation is only honoured between stages and once more after the
    /// last one, so a request made during the final stage still wins over
    /// completion. Progress reported to
    /// `sink` never decreases. The first stage error, timeout or panic ends
    /// the run.
    pub async fn run(
        &self,
        mut ctx: StageContext,
        cancellation: &CancellationController,
        sink: &dyn ProgressSink,
    ) -> PipelineOutcome {
        let job_id = ctx.job_id;
        let mut progress = 0u8;

        for stage in &self.stages {
            let name = stage.name();
            if cancellation.is_cancel_requested(job_id).await {
                tracing::info!(%job_id, before_stage = name, "Conversion cancelled");
                return PipelineOutcome::Cancelled {
                    before_stage: Some(name),
                };
            }

            progress = progress.max(stage.progress_start().min(100));
            sink.stage_started(job_id, name, stage.status(), progress).await;

            let limit = stage.timeout().unwrap_or(self.stage_timeout);
            let started = Instant::now();
            let result = match tokio::time::timeout(
                limit,
                AssertUnwindSafe(stage.execute(&mut ctx)).catch_unwind(),
            )
            .await
            {
                Err(_) => Err(StageError::Timeout(limit)),
                Ok(Err(panic)) => Err(StageError::AgentExecution(format!(
                    "Stage panicked: {}",
                    panic_message(panic.as_ref())
                ))),
                Ok(Ok(result)) => result,
            };

            match result {
                Ok(outcome) => {
                    progress = progress.saturating_add(outcome.progress_delta).min(100);
                    tracing::debug!(
                        %job_id,
                        stage = name,
                        progress,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Stage finished",
                    );
                    sink.stage_finished(job_id, name, progress, &outcome.message, &outcome.output)
                        .await;
                }
                Err(error) => {
                    tracing::warn!(
                        %job_id,
                        stage = name,
                        error = %error,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Stage failed",
                    );
                    return PipelineOutcome::Failed { stage: name, error };
                }
            }
        }

        if cancellation.is_cancel_requested(job_id).await {
            tracing::info!(%job_id, "Conversion cancelled after the final stage");
            return PipelineOutcome::Cancelled { before_stage: None };
        }

        let Some(result_reference) = ctx.package_reference.take() else {
            return PipelineOutcome::Failed {
                stage: STAGE_PACKAGING_AGENT,
                error: StageError::Packaging("Pipeline finished without a package".into()),
            };
        };

        let mod_name = ctx
            .artifact
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default();
        let report = ConversionReport::build(
            job_id,
            mod_name,
            ctx.engine.table_version(),
            &ctx.features,
        );
        PipelineOutcome::Completed {
            result_reference,
            report,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
