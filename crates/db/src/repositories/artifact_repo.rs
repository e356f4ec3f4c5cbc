//! Uploaded mod artifacts and packaged add-ons.

use std::collections::HashMap;

use async_trait::async_trait;
use modporter_core::artifact::ModArtifact;
use modporter_core::types::JobId;
use tokio::sync::RwLock;

use super::RepoError;

/// Extension of packaged Bedrock add-ons.
pub const PACKAGE_EXTENSION: &str = "mcaddon";

/// Storage for mod artifacts (input) and packaged add-ons (output).
#[async_trait]
pub trait ArtifactRepo: Send + Sync {
    /// Register an artifact and return its handle.
    async fn put_artifact(&self, artifact: ModArtifact) -> Result<String, RepoError>;

    async fn find_artifact(&self, file_id: &str) -> Result<Option<ModArtifact>, RepoError>;

    /// Store a packaged add-on and return its result reference.
    async fn put_package(&self, job_id: JobId, bytes: Vec<u8>) -> Result<String, RepoError>;

    async fn find_package(&self, reference: &str) -> Result<Option<Vec<u8>>, RepoError>;
}

/// Process-local [`ArtifactRepo`].
#[derive(Default)]
pub struct MemoryArtifactRepo {
    artifacts: RwLock<HashMap<String, ModArtifact>>,
    packages: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepo for MemoryArtifactRepo {
    async fn put_artifact(&self, artifact: ModArtifact) -> Result<String, RepoError> {
        let file_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(file_id = %file_id, mod_id = %artifact.mod_id, "Artifact registered");
        self.artifacts
            .write()
            .await
            .insert(file_id.clone(), artifact);
        Ok(file_id)
    }

    async fn find_artifact(&self, file_id: &str) -> Result<Option<ModArtifact>, RepoError> {
        Ok(self.artifacts.read().await.get(file_id).cloned())
    }

    async fn put_package(&self, job_id: JobId, bytes: Vec<u8>) -> Result<String, RepoError> {
        let reference = format!("packages/{job_id}.{PACKAGE_EXTENSION}");
        tracing::debug!(%job_id, size = bytes.len(), reference = %reference, "Package stored");
        self.packages
            .write()
            .await
            .insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn find_package(&self, reference: &str) -> Result<Option<Vec<u8>>, RepoError> {
        Ok(self.packages.read().await.get(reference).cloned())
    }
}
