//! Progress event types.

use modporter_core::job_events::{
    MSG_TYPE_AGENT_PROGRESS, MSG_TYPE_CONNECTION_ESTABLISHED, MSG_TYPE_CONVERSION_CANCELLED,
    MSG_TYPE_CONVERSION_COMPLETE, MSG_TYPE_CONVERSION_FAILED,
};
use modporter_core::types::{JobId, SequenceNumber, Timestamp};
use serde::{Deserialize, Serialize};

/// Kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ConnectionEstablished,
    AgentProgress,
    ConversionComplete,
    ConversionFailed,
    ConversionCancelled,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionEstablished => MSG_TYPE_CONNECTION_ESTABLISHED,
            Self::AgentProgress => MSG_TYPE_AGENT_PROGRESS,
            Self::ConversionComplete => MSG_TYPE_CONVERSION_COMPLETE,
            Self::ConversionFailed => MSG_TYPE_CONVERSION_FAILED,
            Self::ConversionCancelled => MSG_TYPE_CONVERSION_CANCELLED,
        }
    }

    /// Terminal events end a job's stream; exactly one is published per job.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ConversionComplete | Self::ConversionFailed | Self::ConversionCancelled
        )
    }
}

/// Event-specific data, all optional.
///
/// Built with the `with_*` methods:
///
/// ```rust
/// use modporter_events::ProgressUpdate;
///
/// let update = ProgressUpdate::new()
///     .with_agent("JavaAnalyzer")
///     .with_progress(20)
///     .with_message("Found 12 features");
/// assert_eq!(update.progress, Some(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub agent: Option<String>,
    pub status: Option<String>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One entry of a job's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Strictly increasing per job, starting at 1.
    ///
    /// `connection_established` is not part of the log; it carries the
    /// sequence number of the newest logged event at connect time.
    pub sequence_number: SequenceNumber,
    pub event_type: EventType,
    pub payload: ProgressUpdate,
    pub timestamp: Timestamp,
}
