//! Event-driven orchestrator.
//!
//! Each handler runs in one transaction and may be invoked more than once for
//! the same envelope. Handlers are idempotent through the integration event id
//! where results are recorded, and through entity state elsewhere.

pub(crate) mod cascade;
mod handlers;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn, Instrument};

use crate::engine::Engine;
use crate::errors::Result;
use crate::events::{InboundEvent, IntegrationEnvelope};
use crate::observability::HandlerSpanAttributes;

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerOutcome {
    /// State changed.
    Applied,
    /// The event had already been applied; nothing changed.
    Duplicate,
    /// No handler is registered for the event kind.
    Unhandled,
}

impl fmt::Display for HandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Unhandled => write!(f, "unhandled"),
        }
    }
}

/// Applies inbound events to the workflow state.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    engine: Engine,
}

impl Orchestrator {
    /// Creates a new orchestrator.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Routes an envelope to its handler inside a tracing span.
    ///
    /// Duplicates are logged at `info`, rejections at `warn` and transient
    /// failures at `error`.
    pub async fn handle(&self, envelope: IntegrationEnvelope<InboundEvent>) -> Result<HandlerOutcome> {
        let kind = envelope.data.kind();
        let attrs = HandlerSpanAttributes::new(kind, envelope.integration_event_id);
        let span = attrs.span();

        let IntegrationEnvelope {
            integration_event_id,
            data,
        } = envelope;
        let result = async move {
            match data {
                InboundEvent::ApplicationSubmitted(event) => {
                    self.on_application_submitted(integration_event_id, event).await
                }
                InboundEvent::StageCompleted(event) => {
                    self.on_stage_completed(integration_event_id, event).await
                }
                InboundEvent::ContestInterrupted(event) => {
                    self.on_contest_interrupted(integration_event_id, event).await
                }
                InboundEvent::ContestTemplateVersionChanged(event) => {
                    self.on_contest_template_version_changed(integration_event_id, event)
                        .await
                }
                InboundEvent::ProcedureStageAdvanced(event) => {
                    self.on_procedure_stage_advanced(integration_event_id, event).await
                }
            }
        }
        .instrument(span.clone())
        .await;

        span.in_scope(|| match &result {
            Ok(HandlerOutcome::Duplicate) => info!(outcome = "duplicate", "Event already applied"),
            Ok(outcome) => info!(outcome = %outcome, "Event handled"),
            Err(err) if err.is_retriable() => {
                error!(error = %err, code = %err.info().code, "Event handling failed");
            }
            Err(err) => warn!(error = %err, code = %err.info().code, "Event rejected"),
        });
        result
    }
}
