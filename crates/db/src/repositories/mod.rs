//! Storage collaborator interfaces and their in-memory implementations.

mod artifact_repo;
mod job_repo;

pub use artifact_repo::{ArtifactRepo, MemoryArtifactRepo};
pub use job_repo::{JobRepo, MemoryJobRepo};

use modporter_core::error::CoreError;
use modporter_core::types::JobId;

/// Failure reported by a repository.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Job {0} already exists")]
    DuplicateJob(JobId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<RepoError> for CoreError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::JobNotFound(id) => CoreError::NotFound {
                entity: "Job",
                id: id.to_string(),
            },
            RepoError::DuplicateJob(id) => CoreError::Conflict(format!("Job {id} already exists")),
            RepoError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}
