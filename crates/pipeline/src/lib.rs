//! Conversion pipeline: six stage agents run strictly in order.
//!
//! ```text
//! JavaAnalyzer -> BedrockArchitect -> LogicTranslator -> AssetConverter
//!              -> PackagingAgent -> QAValidator
//! ```
//!
//! Each stage implements [`Stage`]. The [`ConversionPipeline`] runner
//! checks the [`CancellationController`] before every stage, bounds each
//! stage with a timeout, reports milestones through a [`ProgressSink`],
//! and halts on the first failure.

pub mod cancellation;
pub mod context;
pub mod progress;
pub mod runner;
pub mod stage;
pub mod stages;

pub use cancellation::CancellationController;
pub use context::StageContext;
pub use progress::ProgressSink;
pub use runner::{ConversionPipeline, PipelineOutcome};
pub use stage::{Stage, StageError, StageResult};
