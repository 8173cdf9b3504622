//! Events published to the broker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::inbound::{ContestTemplateVersionChanged, InboundEvent, ProcedureStageTransition};

/// Tells an executor to start working on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStarted {
    /// The procedure the work belongs to.
    pub procedure_instance_id: Uuid,
    /// Set for contest and application stages.
    pub contest_instance_id: Option<Uuid>,
    /// Set for application stages.
    pub application_instance_id: Option<Uuid>,
    /// The stage to work on.
    pub stage_id: Uuid,
    /// Stage type name.
    pub stage_type: String,
    /// The resolved executor.
    pub executor_name: String,
}

/// Broadcast after a contest was interrupted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestInterruptedNotice {
    /// The contest.
    pub contest_instance_id: Uuid,
    /// The owning procedure.
    pub procedure_instance_id: Uuid,
    /// Audit reason.
    pub reason: String,
}

/// Broadcast after a contest template version was published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersionPublished {
    /// Contest template id.
    pub template_id: Uuid,
    /// Owning procedure template.
    pub procedure_template_id: Uuid,
    /// Template name.
    pub name: String,
    /// Published version.
    pub version: u32,
    /// Stage type names in chain order.
    pub stage_types: Vec<String>,
}

/// Any event the engine publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    /// See [`StageStarted`].
    StageStarted(StageStarted),
    /// See [`ProcedureStageTransition`].
    StageTransitionRequested(ProcedureStageTransition),
    /// See [`ContestInterruptedNotice`].
    ContestInterrupted(ContestInterruptedNotice),
    /// See [`TemplateVersionPublished`].
    TemplateVersionPublished(TemplateVersionPublished),
}

impl OutboundEvent {
    /// The broker topic this event is published to.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::StageStarted(_) => "orchestrator.stage-started",
            Self::StageTransitionRequested(_) => "orchestrator.procedure-stage-transition",
            Self::ContestInterrupted(_) => "orchestrator.contest-interrupted",
            Self::TemplateVersionPublished(_) => "orchestrator.contest-template-published",
        }
    }

    /// Maps events the engine also consumes onto their inbound form.
    #[must_use]
    pub fn as_inbound(&self) -> Option<InboundEvent> {
        match self {
            Self::StageTransitionRequested(transition) => {
                Some(InboundEvent::ProcedureStageAdvanced(transition.clone()))
            }
            Self::TemplateVersionPublished(published) => Some(
                InboundEvent::ContestTemplateVersionChanged(ContestTemplateVersionChanged {
                    contest_template_id: published.template_id,
                    new_version: published.version,
                }),
            ),
            Self::StageStarted(_) | Self::ContestInterrupted(_) => None,
        }
    }

    /// Returns the stage-started payload, if this is one.
    #[must_use]
    pub fn as_stage_started(&self) -> Option<&StageStarted> {
        match self {
            Self::StageStarted(started) => Some(started),
            _ => None,
        }
    }
}

impl From<StageStarted> for OutboundEvent {
    fn from(event: StageStarted) -> Self {
        Self::StageStarted(event)
    }
}

impl From<ProcedureStageTransition> for OutboundEvent {
    fn from(event: ProcedureStageTransition) -> Self {
        Self::StageTransitionRequested(event)
    }
}

impl From<ContestInterruptedNotice> for OutboundEvent {
    fn from(event: ContestInterruptedNotice) -> Self {
        Self::ContestInterrupted(event)
    }
}

impl From<TemplateVersionPublished> for OutboundEvent {
    fn from(event: TemplateVersionPublished) -> Self {
        Self::TemplateVersionPublished(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_payload_is_untagged_camel_case() {
        let event = OutboundEvent::from(StageStarted {
            procedure_instance_id: Uuid::nil(),
            contest_instance_id: None,
            application_instance_id: None,
            stage_id: Uuid::nil(),
            stage_type: "Setup".to_string(),
            executor_name: "setup-service".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stageType"], "Setup");
        assert_eq!(json["executorName"], "setup-service");
        assert!(json.get("StageStarted").is_none());
    }

    #[test]
    fn test_transition_loops_back_on_the_inbound_topic() {
        let event = OutboundEvent::from(ProcedureStageTransition {
            procedure_instance_id: Uuid::new_v4(),
            current_stage_id: Uuid::new_v4(),
            next_stage_id: None,
        });
        let inbound = event.as_inbound().unwrap();
        assert_eq!(inbound.kind(), EventKind::ProcedureStageAdvanced);
        assert_eq!(event.topic(), inbound.kind().topic());
    }
}
