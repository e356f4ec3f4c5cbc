//! Job record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use modporter_core::report::ConversionReport;
use modporter_core::types::JobId;
use tokio::sync::RwLock;

use super::RepoError;
use crate::models::job::{Job, JobListQuery};

/// Storage for job records and their conversion reports.
///
/// Implementations must make [`JobRepo::update`] atomic: readers see either
/// the previous or the new record, never a mix.
#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<(), RepoError>;

    async fn find_by_id(&self, job_id: JobId) -> Result<Option<Job>, RepoError>;

    /// Replace the stored record with `job`.
    async fn update(&self, job: &Job) -> Result<(), RepoError>;

    /// Remove the record and its report. Returns `false` if absent.
    async fn delete(&self, job_id: JobId) -> Result<bool, RepoError>;

    /// Newest first, filtered and paginated per `query`.
    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, RepoError>;

    async fn save_report(&self, report: &ConversionReport) -> Result<(), RepoError>;

    async fn find_report(&self, job_id: JobId) -> Result<Option<ConversionReport>, RepoError>;
}

/// Process-local [`JobRepo`].
#[derive(Default)]
pub struct MemoryJobRepo {
    jobs: RwLock<HashMap<JobId, Job>>,
    reports: RwLock<HashMap<JobId, ConversionReport>>,
}

impl MemoryJobRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepo for MemoryJobRepo {
    async fn insert(&self, job: &Job) -> Result<(), RepoError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.job_id) {
            return Err(RepoError::DuplicateJob(job.job_id));
        }
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, job_id: JobId) -> Result<Option<Job>, RepoError> {
        Ok(self.jobs.read().await.get(&job_id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<(), RepoError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.job_id) {
            Some(stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(RepoError::JobNotFound(job.job_id)),
        }
    }

    async fn delete(&self, job_id: JobId) -> Result<bool, RepoError> {
        self.reports.write().await.remove(&job_id);
        Ok(self.jobs.write().await.remove(&job_id).is_some())
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, RepoError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(query.offset())
            .take(query.clamped_limit())
            .cloned()
            .collect())
    }

    async fn save_report(&self, report: &ConversionReport) -> Result<(), RepoError> {
        if !self.jobs.read().await.contains_key(&report.job_id) {
            return Err(RepoError::JobNotFound(report.job_id));
        }
        self.reports
            .write()
            .await
            .insert(report.job_id, report.clone());
        Ok(())
    }

    async fn find_report(&self, job_id: JobId) -> Result<Option<ConversionReport>, RepoError> {
        Ok(self.reports.read().await.get(&job_id).cloned())
    }
}
