//! Events consumed from the broker.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core::ResultStatus;
use crate::errors::{ContestflowError, Result};

/// Transport envelope carrying a globally unique idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEnvelope<T> {
    /// Unique per logical event; redeliveries repeat it.
    pub integration_event_id: Uuid,
    /// The event payload.
    pub data: T,
}

impl<T> IntegrationEnvelope<T> {
    /// Wraps a payload with an explicit event id.
    #[must_use]
    pub fn new(integration_event_id: Uuid, data: T) -> Self {
        Self {
            integration_event_id,
            data,
        }
    }

    /// Wraps a payload with a fresh event id.
    #[must_use]
    pub fn fresh(data: T) -> Self {
        Self::new(crate::utils::generate_uuid(), data)
    }
}

/// The kinds of inbound event, one handler each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new application for a contest.
    ApplicationSubmitted,
    /// An executor finished an application stage.
    StageCompleted,
    /// A contest must be interrupted.
    ContestInterrupted,
    /// A new contest template version was published.
    ContestTemplateVersionChanged,
    /// A procedure stage transition was decided.
    ProcedureStageAdvanced,
}

impl EventKind {
    /// Every kind.
    pub const ALL: [Self; 5] = [
        Self::ApplicationSubmitted,
        Self::StageCompleted,
        Self::ContestInterrupted,
        Self::ContestTemplateVersionChanged,
        Self::ProcedureStageAdvanced,
    ];

    /// The broker topic this kind is consumed from.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ApplicationSubmitted => "orchestrator.create-application",
            Self::StageCompleted => "orchestrator.stage-completed",
            Self::ContestInterrupted => "orchestrator.interrupt-contest",
            Self::ContestTemplateVersionChanged => "orchestrator.contest-template-updated",
            Self::ProcedureStageAdvanced => "orchestrator.procedure-stage-transition",
        }
    }

    /// Resolves a topic name.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Request to create an application in a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSubmitted {
    /// Target contest.
    pub contest_instance_id: Uuid,
    /// Identifier assigned by the submitting system.
    #[serde(default)]
    pub external_application_id: Option<Uuid>,
    /// Opaque applicant data.
    #[serde(default)]
    pub application_data: Option<serde_json::Value>,
}

impl ApplicationSubmitted {
    /// Creates a submission without applicant data.
    #[must_use]
    pub fn new(contest_instance_id: Uuid) -> Self {
        Self {
            contest_instance_id,
            external_application_id: None,
            application_data: None,
        }
    }
}

/// An executor's report for one application stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCompleted {
    /// The application.
    pub application_instance_id: Uuid,
    /// The stage the executor worked on.
    pub stage_id: Uuid,
    /// Outcome.
    pub result_status: ResultStatus,
    /// Opaque executor output.
    #[serde(default)]
    pub result_data: Option<serde_json::Value>,
}

impl StageCompleted {
    /// Creates a report without output data.
    #[must_use]
    pub fn new(application_instance_id: Uuid, stage_id: Uuid, result_status: ResultStatus) -> Self {
        Self {
            application_instance_id,
            stage_id,
            result_status,
            result_data: None,
        }
    }
}

/// Request to interrupt a contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptContest {
    /// The contest.
    pub contest_instance_id: Uuid,
    /// Audit reason.
    #[serde(default)]
    pub reason: String,
}

/// Notice that contest instances bound to a template should move to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestTemplateVersionChanged {
    /// Contest template id.
    pub contest_template_id: Uuid,
    /// Target version.
    pub new_version: u32,
}

/// A procedure stage transition decision.
///
/// Emitted by the cascade and consumed by the procedure handler, which
/// replays the decision without recomputing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureStageTransition {
    /// The procedure.
    pub procedure_instance_id: Uuid,
    /// The stage the decision was made at.
    pub current_stage_id: Uuid,
    /// The stage to move to; `None` completes the procedure.
    pub next_stage_id: Option<Uuid>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// See [`ApplicationSubmitted`].
    ApplicationSubmitted(ApplicationSubmitted),
    /// See [`StageCompleted`].
    StageCompleted(StageCompleted),
    /// See [`InterruptContest`].
    ContestInterrupted(InterruptContest),
    /// See [`ContestTemplateVersionChanged`].
    ContestTemplateVersionChanged(ContestTemplateVersionChanged),
    /// See [`ProcedureStageTransition`].
    ProcedureStageAdvanced(ProcedureStageTransition),
}

impl InboundEvent {
    /// Returns the kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ApplicationSubmitted(_) => EventKind::ApplicationSubmitted,
            Self::StageCompleted(_) => EventKind::StageCompleted,
            Self::ContestInterrupted(_) => EventKind::ContestInterrupted,
            Self::ContestTemplateVersionChanged(_) => EventKind::ContestTemplateVersionChanged,
            Self::ProcedureStageAdvanced(_) => EventKind::ProcedureStageAdvanced,
        }
    }

    /// The instance or template this event acts on. Events sharing an
    /// aggregate are handled in delivery order.
    #[must_use]
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            Self::ApplicationSubmitted(e) => e.contest_instance_id,
            Self::StageCompleted(e) => e.application_instance_id,
            Self::ContestInterrupted(e) => e.contest_instance_id,
            Self::ContestTemplateVersionChanged(e) => e.contest_template_id,
            Self::ProcedureStageAdvanced(e) => e.procedure_instance_id,
        }
    }

    /// Decodes a payload of the given kind.
    pub fn decode(kind: EventKind, data: serde_json::Value) -> Result<Self> {
        Ok(match kind {
            EventKind::ApplicationSubmitted => Self::ApplicationSubmitted(serde_json::from_value(data)?),
            EventKind::StageCompleted => Self::StageCompleted(serde_json::from_value(data)?),
            EventKind::ContestInterrupted => Self::ContestInterrupted(serde_json::from_value(data)?),
            EventKind::ContestTemplateVersionChanged => {
                Self::ContestTemplateVersionChanged(serde_json::from_value(data)?)
            }
            EventKind::ProcedureStageAdvanced => {
                Self::ProcedureStageAdvanced(serde_json::from_value(data)?)
            }
        })
    }

    /// Encodes the payload as JSON.
    pub fn encode(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::ApplicationSubmitted(e) => serde_json::to_value(e)?,
            Self::StageCompleted(e) => serde_json::to_value(e)?,
            Self::ContestInterrupted(e) => serde_json::to_value(e)?,
            Self::ContestTemplateVersionChanged(e) => serde_json::to_value(e)?,
            Self::ProcedureStageAdvanced(e) => serde_json::to_value(e)?,
        })
    }
}

/// A raw message as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    /// Topic the message arrived on.
    pub topic: String,
    /// Envelope JSON: `{integrationEventId, data}`.
    pub payload: serde_json::Value,
}

impl Delivery {
    /// Builds a delivery for an inbound event.
    pub fn from_event(envelope: &IntegrationEnvelope<InboundEvent>) -> Result<Self> {
        let wire = IntegrationEnvelope::new(envelope.integration_event_id, envelope.data.encode()?);
        Ok(Self {
            topic: envelope.data.kind().topic().to_string(),
            payload: serde_json::to_value(wire)?,
        })
    }

    /// Decodes the topic and envelope.
    pub fn decode(&self) -> Result<IntegrationEnvelope<InboundEvent>> {
        let kind = EventKind::from_topic(&self.topic).ok_or_else(|| {
            ContestflowError::Serialization(format!("unknown topic '{}'", self.topic))
        })?;
        let wire: IntegrationEnvelope<serde_json::Value> =
            serde_json::from_value(self.payload.clone())?;
        Ok(IntegrationEnvelope::new(
            wire.integration_event_id,
            InboundEvent::decode(kind, wire.data)?,
        ))
    }
}
