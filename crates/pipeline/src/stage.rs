//! The uniform stage contract.

use std::time::Duration;

use async_trait::async_trait;
use modporter_db::models::job::JobErrorKind;
use modporter_db::models::status::JobStatus;

use crate::context::StageContext;

pub const STAGE_JAVA_ANALYZER: &str = "JavaAnalyzer";
pub const STAGE_BEDROCK_ARCHITECT: &str = "BedrockArchitect";
pub const STAGE_LOGIC_TRANSLATOR: &str = "LogicTranslator";
pub const STAGE_ASSET_CONVERTER: &str = "AssetConverter";
pub const STAGE_PACKAGING_AGENT: &str = "PackagingAgent";
pub const STAGE_QA_VALIDATOR: &str = "QAValidator";

/// Successful stage outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    /// Stage-specific summary, forwarded as progress event details.
    pub output: serde_json::Value,
    /// Percentage points this stage contributes to job progress.
    pub progress_delta: u8,
    pub message: String,
}

impl StageResult {
    pub fn new(progress_delta: u8, message: impl Into<String>) -> Self {
        Self {
            output: serde_json::Value::Object(Default::default()),
            progress_delta,
            message: message.into(),
        }
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = output;
        self
    }
}

/// Why a stage failed. Any failure is fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// The stage's own logic failed.
    #[error("{0}")]
    AgentExecution(String),

    /// The stage did not finish within its time bound.
    #[error("stage exceeded its {}s time limit", .0.as_secs())]
    Timeout(Duration),

    /// The add-on archive could not be assembled or stored.
    #[error("{0}")]
    Packaging(String),

    /// The packaged add-on failed structural validation.
    #[error("{0}")]
    QaValidation(String),
}

impl StageError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            Self::AgentExecution(_) => JobErrorKind::AgentExecution,
            Self::Timeout(_) => JobErrorKind::Timeout,
            Self::Packaging(_) => JobErrorKind::Packaging,
            Self::QaValidation(_) => JobErrorKind::QaValidation,
        }
    }
}

/// One ordered unit of the conversion pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name recorded on the job and in progress events.
    fn name(&self) -> &'static str;

    /// Job status while this stage runs.
    fn status(&self) -> JobStatus;

    /// Progress at which the stage starts.
    fn progress_start(&self) -> u8;

    /// Own time bound; `None` uses the pipeline default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageResult, StageError>;
}
