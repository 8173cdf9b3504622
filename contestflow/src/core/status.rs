//! Instance status and stage result enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status label for a contest that has finished all of its work.
pub const STATUS_COMPLETED: &str = "Completed";
/// Status label for an administratively stopped entity.
pub const STATUS_INTERRUPTED: &str = "Interrupted";
/// Status label for a contest that is working through its stages.
pub const STATUS_IN_PROGRESS: &str = "InProgress";
/// Status a contest takes when its template's status model is empty.
pub const STATUS_NOT_STARTED: &str = "NotStarted";

/// Closed set of statuses that mark an entity as finished.
pub const TERMINAL_STATUSES: [&str; 5] = ["Completed", "Approved", "Rejected", "Failed", "Interrupted"];

/// Returns true if the status label is one of the terminal statuses.
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// Outcome reported by a stage executor for one application stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    /// The stage passed; the application moves on.
    Success,
    /// The application was turned down at this stage.
    Rejected,
    /// The stage could not be carried out.
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "Success"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a procedure instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProcedureStatus {
    /// The procedure is running.
    #[default]
    Active,
    /// The procedure went through its last stage.
    Completed,
    /// The procedure was stopped.
    Interrupted,
}

impl ProcedureStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

impl fmt::Display for ProcedureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Completed => write!(f, "Completed"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Status of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Created and positioned at the first stage.
    #[default]
    Submitted,
    /// Past the first stage.
    InProgress,
    /// Passed every stage.
    Approved,
    /// Turned down by a stage.
    Rejected,
    /// A stage could not be carried out.
    Failed,
    /// Stopped together with its contest.
    Interrupted,
}

impl ApplicationStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Submitted | Self::InProgress)
    }

    /// Maps a non-success stage result onto the matching terminal status.
    #[must_use]
    pub fn from_result(result: ResultStatus) -> Option<Self> {
        match result {
            ResultStatus::Success => None,
            ResultStatus::Rejected => Some(Self::Rejected),
            ResultStatus::Failed => Some(Self::Failed),
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "Submitted"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
            Self::Failed => write!(f, "Failed"),
            Self::Interrupted => write!(f, "Interrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_match_enums() {
        for status in [
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
            ApplicationStatus::Failed,
            ApplicationStatus::Interrupted,
        ] {
            assert!(status.is_terminal());
            assert!(is_terminal_status(&status.to_string()));
        }
        assert!(!is_terminal_status(&ApplicationStatus::Submitted.to_string()));
        assert!(!is_terminal_status(&ProcedureStatus::Active.to_string()));
        assert!(is_terminal_status(&ProcedureStatus::Completed.to_string()));
    }

    #[test]
    fn test_from_result() {
        assert_eq!(ApplicationStatus::from_result(ResultStatus::Success), None);
        assert_eq!(
            ApplicationStatus::from_result(ResultStatus::Rejected),
            Some(ApplicationStatus::Rejected)
        );
        assert_eq!(
            ApplicationStatus::from_result(ResultStatus::Failed),
            Some(ApplicationStatus::Failed)
        );
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&ApplicationStatus::InProgress).unwrap();
        assert_eq!(json, r#""InProgress""#);

        let status: ResultStatus = serde_json::from_str(r#""Rejected""#).unwrap();
        assert_eq!(status, ResultStatus::Rejected);
    }
}
