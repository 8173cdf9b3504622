//! Template data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::chain::{StageChain, StageSpec};
use crate::core::{ContestStageType, ProcedureStageType, STATUS_COMPLETED, STATUS_INTERRUPTED};
use crate::utils::Timestamp;

/// Identity of one contest template version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateKey {
    /// Template id, shared by all versions.
    pub id: Uuid,
    /// Positive version number.
    pub version: u32,
}

impl TemplateKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(id: Uuid, version: u32) -> Self {
        Self { id, version }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// A versioned procedure definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureTemplate {
    /// Template id.
    pub id: Uuid,
    /// Human readable name; at most one published template per name.
    pub name: String,
    /// Positive version number.
    pub version: u32,
    /// Whether the template is published (and therefore frozen).
    pub is_published: bool,
    /// The stage chain.
    pub stages: StageChain<ProcedureStageType>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl ProcedureTemplate {
    /// Returns the `Contests` stage of the chain.
    #[must_use]
    pub fn contests_stage_id(&self) -> Option<Uuid> {
        self.stages
            .by_type(ProcedureStageType::Contests)
            .map(|stage| stage.id)
    }
}

/// A versioned contest definition belonging to a procedure template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestTemplate {
    /// Template id, shared by all versions.
    pub id: Uuid,
    /// The procedure template this contest template belongs to.
    pub procedure_template_id: Uuid,
    /// Human readable name.
    pub name: String,
    /// Positive version number.
    pub version: u32,
    /// Whether this version is published.
    pub is_published: bool,
    /// Status labels valid for instances of this template.
    pub status_model: Vec<String>,
    /// The stage chain.
    pub stages: StageChain<ContestStageType>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl ContestTemplate {
    /// Returns the `(id, version)` key.
    #[must_use]
    pub fn key(&self) -> TemplateKey {
        TemplateKey::new(self.id, self.version)
    }

    /// Returns true if the status model contains `status`.
    #[must_use]
    pub fn permits(&self, status: &str) -> bool {
        self.status_model.iter().any(|s| s == status)
    }

    /// Returns true if instances may be completed.
    #[must_use]
    pub fn permits_completion(&self) -> bool {
        self.permits(STATUS_COMPLETED)
    }

    /// Returns true if instances may be interrupted.
    #[must_use]
    pub fn permits_interruption(&self) -> bool {
        self.permits(STATUS_INTERRUPTED)
    }
}

/// Input for creating or replacing a procedure template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureTemplateDraft {
    /// Template name.
    pub name: String,
    /// Explicit version; defaults to one past the highest version with the same name.
    #[serde(default)]
    pub version: Option<u32>,
    /// Unordered stage specs.
    pub stages: Vec<StageSpec<ProcedureStageType>>,
}

impl ProcedureTemplateDraft {
    /// Creates a draft with no explicit version.
    #[must_use]
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec<ProcedureStageType>>) -> Self {
        Self {
            name: name.into(),
            version: None,
            stages,
        }
    }

    /// Sets an explicit version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }
}

/// Input for creating or replacing a contest template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestTemplateDraft {
    /// Template name.
    pub name: String,
    /// Status labels for instances.
    #[serde(default)]
    pub status_model: Vec<String>,
    /// Unordered stage specs.
    pub stages: Vec<StageSpec<ContestStageType>>,
}

impl ContestTemplateDraft {
    /// Creates a draft.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        status_model: Vec<String>,
        stages: Vec<StageSpec<ContestStageType>>,
    ) -> Self {
        Self {
            name: name.into(),
            status_model,
            stages,
        }
    }
}
