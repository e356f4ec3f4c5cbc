//! Job records and the storage collaborators the conversion service talks to.
//!
//! Persistent storage is provided from outside the core; this crate defines
//! the [`repositories::JobRepo`] and [`repositories::ArtifactRepo`] seams
//! and ships in-memory implementations used by the server and the tests.

pub mod models;
pub mod repositories;

pub use repositories::{ArtifactRepo, JobRepo, MemoryArtifactRepo, MemoryJobRepo, RepoError};
