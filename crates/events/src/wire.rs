//! JSON envelope sent over the real-time channel.
//!
//! ```text
//! { "type": "agent_progress",
//!   "data": { "job_id": "...", "sequence": 3, "agent": "JavaAnalyzer",
//!             "status": "ANALYZING", "progress": 20, "message": "...",
//!             "details": {...}, "timestamp": "2024-01-01T00:00:00Z" } }
//! ```
//!
//! Absent optional fields are omitted rather than sent as `null`.

use serde::Serialize;

use crate::event::ProgressEvent;

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: WireData<'a>,
}

#[derive(Debug, Serialize)]
pub struct WireData<'a> {
    pub job_id: String,
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<&'a serde_json::Value>,
    /// RFC 3339 / ISO-8601.
    pub timestamp: String,
}

impl<'a> From<&'a ProgressEvent> for WireMessage<'a> {
    fn from(event: &'a ProgressEvent) -> Self {
        let p = &event.payload;
        Self {
            kind: event.event_type.as_str(),
            data: WireData {
                job_id: event.job_id.to_string(),
                sequence: event.sequence_number,
                agent: p.agent.as_deref(),
                status: p.status.as_deref(),
                progress: p.progress,
                message: p.message.as_deref(),
                details: p.details.as_ref(),
                timestamp: event.timestamp.to_rfc3339(),
            },
        }
    }
}

/// Render an event as wire JSON text.
pub fn to_wire_text(event: &ProgressEvent) -> String {
    // Serializing plain strings and numbers cannot fail.
    serde_json::to_string(&WireMessage::from(event)).unwrap_or_default()
}
