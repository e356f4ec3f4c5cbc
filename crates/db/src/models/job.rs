//! Conversion job entity, its failure record, and request DTOs.

use std::fmt;

use chrono::Utc;
use modporter_core::artifact::validate_file_id;
use modporter_core::conversion::ConversionOptions;
use modporter_core::error::CoreError;
use modporter_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;

/// Failure category recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobErrorKind {
    #[serde(rename = "AgentExecutionError")]
    AgentExecution,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "PackagingError")]
    Packaging,
    #[serde(rename = "QAValidationError")]
    QaValidation,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AgentExecution => "AgentExecutionError",
            Self::Timeout => "TimeoutError",
            Self::Packaging => "PackagingError",
            Self::QaValidation => "QAValidationError",
        })
    }
}

/// Why and where a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub stage: String,
    pub kind: JobErrorKind,
    pub cause: String,
}

/// One conversion request and its lifecycle state.
///
/// Mutated only through the transition methods below, each of which
/// enforces [`JobStatus::can_transition_to`] and bumps `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    /// 0-100, never decreases within a run.
    pub progress: u8,
    /// Stage currently executing; `None` once terminal.
    pub stage: Option<String>,
    pub message: String,
    pub error: Option<JobError>,
    pub file_id: String,
    pub options: ConversionOptions,
    /// 1 for the first run, incremented by every retry.
    pub attempt: u32,
    pub retry_of: Option<JobId>,
    pub result_reference: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// A fresh `PENDING` job.
    pub fn new(file_id: impl Into<String>, options: ConversionOptions) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new_v4(),
            status: JobStatus::Pending,
            progress: 0,
            stage: None,
            message: "Conversion queued".into(),
            error: None,
            file_id: file_id.into(),
            options,
            attempt: 1,
            retry_of: None,
            result_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new `PENDING` job re-running this one's input.
    pub fn retry(&self) -> Self {
        let mut job = Self::new(self.file_id.clone(), self.options.clone());
        job.attempt = self.attempt + 1;
        job.retry_of = Some(self.job_id);
        job
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {next}",
                self.job_id, self.status
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Enter a pipeline stage.
    pub fn begin_stage(
        &mut self,
        stage: &str,
        status: JobStatus,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.transition(status)?;
        self.stage = Some(stage.to_string());
        self.message = message.into();
        Ok(())
    }

    /// Record progress within the current run. Lower values are ignored.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.job_id, self.status
            )));
        }
        self.progress = self.progress.max(progress.min(100));
        self.message = message.into();
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(
        &mut self,
        result_reference: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), CoreError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.stage = None;
        self.message = message.into();
        self.result_reference = Some(result_reference.into());
        Ok(())
    }

    pub fn fail(&mut self, error: JobError) -> Result<(), CoreError> {
        self.transition(JobStatus::Failed)?;
        self.message = format!("{} failed: {}", error.stage, error.cause);
        // The failing stage stays visible on the record.
        self.stage = Some(error.stage.clone());
        self.error = Some(error);
        Ok(())
    }

    pub fn cancel(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Cancelled)?;
        self.stage = None;
        self.message = message.into();
        Ok(())
    }
}

/// Body of `POST /api/v1/conversions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitConversion {
    /// Handle of an already-uploaded artifact.
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl SubmitConversion {
    /// Validate the request shape and return the artifact handle.
    pub fn validate(&self) -> Result<&str, CoreError> {
        let file_id = self
            .file_id
            .as_deref()
            .ok_or_else(|| CoreError::Validation("fileId is required".into()))?;
        validate_file_id(file_id)?;
        self.options.target()?;
        Ok(file_id)
    }
}

/// Maximum page size for job listing.
pub const MAX_LIMIT: usize = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: usize = 50;

/// Query parameters for `GET /api/v1/conversions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    /// Defaults to 50, capped at 100.
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobListQuery {
    pub fn clamped_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}
