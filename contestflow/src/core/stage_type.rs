//! Closed enumerations of stage types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// A closed enumeration of stage types usable in a [`StageChain`](crate::chain::StageChain).
///
/// Stage types are unique within a chain and are the only identity that
/// survives across template versions.
pub trait StageType:
    Copy + Eq + Hash + Ord + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every variant, in declaration order.
    const ALL: &'static [Self];

    /// Returns the stable name of this stage type.
    fn name(&self) -> &'static str;

    /// Parses a stage type from its stable name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

/// Stage types of a procedure template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProcedureStageType {
    /// Preparation of the procedure.
    Setup,
    /// The stage during which contests run.
    Contests,
    /// Contracting with winners.
    Contracts,
    /// Final reporting.
    Reporting,
}

impl ProcedureStageType {
    /// Returns true for the stage that owns contest instances.
    #[must_use]
    pub fn is_contests(&self) -> bool {
        matches!(self, Self::Contests)
    }
}

impl StageType for ProcedureStageType {
    const ALL: &'static [Self] = &[Self::Setup, Self::Contests, Self::Contracts, Self::Reporting];

    fn name(&self) -> &'static str {
        match self {
            Self::Setup => "Setup",
            Self::Contests => "Contests",
            Self::Contracts => "Contracts",
            Self::Reporting => "Reporting",
        }
    }
}

impl fmt::Display for ProcedureStageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stage types of a contest template, shared by contests and their applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContestStageType {
    /// Applications are accepted.
    ApplicationSubmission,
    /// Formal checks.
    Validation,
    /// Expert review.
    Expertise,
    /// Funds are distributed.
    FundAllocation,
    /// Results are published.
    WinnerAnnouncement,
}

impl StageType for ContestStageType {
    const ALL: &'static [Self] = &[
        Self::ApplicationSubmission,
        Self::Validation,
        Self::Expertise,
        Self::FundAllocation,
        Self::WinnerAnnouncement,
    ];

    fn name(&self) -> &'static str {
        match self {
            Self::ApplicationSubmission => "ApplicationSubmission",
            Self::Validation => "Validation",
            Self::Expertise => "Expertise",
            Self::FundAllocation => "FundAllocation",
            Self::WinnerAnnouncement => "WinnerAnnouncement",
        }
    }
}

impl fmt::Display for ContestStageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for t in ProcedureStageType::ALL {
            assert_eq!(ProcedureStageType::from_name(t.name()), Some(*t));
        }
        for t in ContestStageType::ALL {
            assert_eq!(ContestStageType::from_name(t.name()), Some(*t));
        }
        assert_eq!(ContestStageType::from_name("Contests"), None);
    }

    #[test]
    fn test_serde_uses_stable_name() {
        let json = serde_json::to_string(&ContestStageType::FundAllocation).unwrap();
        assert_eq!(json, format!("\"{}\"", ContestStageType::FundAllocation.name()));
    }

    #[test]
    fn test_is_contests() {
        assert!(ProcedureStageType::Contests.is_contests());
        assert!(!ProcedureStageType::Setup.is_contests());
    }
}
