//! Conversion job lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a conversion job is in its lifecycle.
///
/// Non-terminal states only move forward (`Pending` -> ... -> `Packaging`).
/// Any non-terminal state may end in `Failed` or `Cancelled`; `Completed`
/// is only reachable from `Packaging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Uploading,
    Analyzing,
    Converting,
    Packaging,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Uploading => "UPLOADING",
            Self::Analyzing => "ANALYZING",
            Self::Converting => "CONVERTING",
            Self::Packaging => "PACKAGING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Position in the forward-only part of the lifecycle.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Uploading => 1,
            Self::Analyzing => 2,
            Self::Converting => 3,
            Self::Packaging => 4,
            Self::Completed | Self::Failed | Self::Cancelled => 5,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Completed => self == Self::Packaging,
            Self::Failed | Self::Cancelled => true,
            _ => next.rank() >= self.rank(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_upper_case_names() {
        assert_eq!(
            serde_json::to_value(JobStatus::Analyzing).unwrap(),
            serde_json::json!("ANALYZING")
        );
        let parsed: JobStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(parsed, JobStatus::Cancelled);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [JobStatus::Pending, JobStatus::Analyzing, JobStatus::Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn lifecycle_moves_forward_only() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Analyzing));
        assert!(JobStatus::Converting.can_transition_to(JobStatus::Converting));
        assert!(JobStatus::Converting.can_transition_to(JobStatus::Packaging));
        assert!(!JobStatus::Packaging.can_transition_to(JobStatus::Analyzing));
    }

    #[test]
    fn completion_requires_packaging() {
        assert!(JobStatus::Packaging.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Converting.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Analyzing.can_transition_to(JobStatus::Failed));
    }
}
