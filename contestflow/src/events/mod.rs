//! Inbound and outbound integration events.
//!
//! Inbound events arrive from the broker wrapped in an [`IntegrationEnvelope`]
//! whose id is the idempotency key. Outbound events are queued in an
//! [`Outbox`] during a transaction and handed to an [`EventPublisher`] after
//! commit.

mod inbound;
mod outbound;
mod outbox;
mod publisher;

pub use inbound::{
    ApplicationSubmitted, ContestTemplateVersionChanged, Delivery, EventKind, InboundEvent,
    IntegrationEnvelope, InterruptContest, ProcedureStageTransition, StageCompleted,
};
pub use outbound::{ContestInterruptedNotice, OutboundEvent, StageStarted, TemplateVersionPublished};
pub use outbox::Outbox;
pub use publisher::{CollectingPublisher, EventPublisher, LoggingPublisher, NoOpPublisher};

#[cfg(test)]
pub use publisher::MockEventPublisher;
