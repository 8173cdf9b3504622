//! Instance data model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ApplicationStatus, ProcedureStatus, ResultStatus};
use crate::templates::TemplateKey;
use crate::utils::Timestamp;

/// A running procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureInstance {
    /// Instance id.
    pub id: Uuid,
    /// Procedure template id.
    pub template_id: Uuid,
    /// Template version captured at creation.
    pub template_version: u32,
    /// Current stage; `None` once terminal.
    pub current_stage_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: ProcedureStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

/// A running contest inside a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestInstance {
    /// Instance id.
    pub id: Uuid,
    /// Owning procedure instance.
    pub procedure_instance_id: Uuid,
    /// Contest template id.
    pub template_id: Uuid,
    /// Contest template version; changes on migration.
    pub template_version: u32,
    /// Current stage; `None` once terminal.
    pub current_stage_id: Option<Uuid>,
    /// A label from the template's status model.
    pub status: String,
    /// Reason recorded by the last interrupt.
    #[serde(default)]
    pub interruption_reason: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl ContestInstance {
    /// Returns the template key this instance is bound to.
    #[must_use]
    pub fn template_key(&self) -> TemplateKey {
        TemplateKey::new(self.template_id, self.template_version)
    }
}

/// An application submitted to a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationInstance {
    /// Instance id.
    pub id: Uuid,
    /// Owning contest instance.
    pub contest_instance_id: Uuid,
    /// Contest template id at submission time.
    pub template_id: Uuid,
    /// Contest template version at submission time.
    pub template_version: u32,
    /// Current stage; `None` once terminal.
    pub current_stage_id: Option<Uuid>,
    /// Lifecycle status.
    pub status: ApplicationStatus,
    /// Identifier assigned by the submitting system.
    #[serde(default)]
    pub external_application_id: Option<Uuid>,
    /// Opaque applicant data.
    #[serde(default)]
    pub application_data: Option<serde_json::Value>,
    /// Integration event id of the submission, if submitted through an event.
    #[serde(default)]
    pub submission_event_id: Option<Uuid>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl ApplicationInstance {
    /// Returns the template key this application resolves its stages against.
    #[must_use]
    pub fn template_key(&self) -> TemplateKey {
        TemplateKey::new(self.template_id, self.template_version)
    }
}

/// Per-contest override of a stage's schedule and executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfiguration {
    /// Configuration id.
    pub id: Uuid,
    /// Owning contest instance.
    pub contest_instance_id: Uuid,
    /// The configured stage.
    pub stage_definition_id: Uuid,
    /// Optional start of the stage window.
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    /// Optional end of the stage window.
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    /// Executor handling the stage for this contest.
    pub executor_name: String,
}

/// Caller input for a stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfigurationInput {
    /// The configured stage.
    pub stage_definition_id: Uuid,
    /// Optional start of the stage window.
    #[serde(default)]
    pub start_date: Option<Timestamp>,
    /// Optional end of the stage window.
    #[serde(default)]
    pub end_date: Option<Timestamp>,
    /// Executor override; blank or missing means the stage default.
    #[serde(default)]
    pub executor_name: Option<String>,
}

impl StageConfigurationInput {
    /// Creates an input that only overrides the executor.
    #[must_use]
    pub fn executor(stage_definition_id: Uuid, executor_name: impl Into<String>) -> Self {
        Self {
            stage_definition_id,
            start_date: None,
            end_date: None,
            executor_name: Some(executor_name.into()),
        }
    }

    /// Sets the stage window.
    #[must_use]
    pub fn with_window(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }
}

/// The recorded outcome of one application stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    /// Result id.
    pub id: Uuid,
    /// The application the result belongs to.
    pub application_instance_id: Uuid,
    /// The completed stage.
    pub stage_definition_id: Uuid,
    /// Reported outcome.
    pub result_status: ResultStatus,
    /// Opaque executor output.
    #[serde(default)]
    pub result_data: Option<serde_json::Value>,
    /// When the result was recorded.
    pub completed_at: Timestamp,
    /// Idempotency key of the reporting event.
    pub integration_event_id: Uuid,
}
