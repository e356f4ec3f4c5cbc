//! Conversion job engine.
//!
//! [`JobManager`] owns job records, dispatches one pipeline run per job and
//! turns each run's outcome into a terminal transition. The progress module
//! records stage milestones and publishes them as progress events.

pub mod manager;
mod progress;

pub use manager::JobManager;
