//! Domain types and pure decision logic for the mod conversion service.
//!
//! Nothing in this crate performs I/O or spawns tasks; the async layers
//! (`modporter-pipeline`, `modporter-api`) build on top of it.

pub mod artifact;
pub mod assumptions;
pub mod conversion;
pub mod error;
pub mod feature;
pub mod job_events;
pub mod report;
pub mod types;
