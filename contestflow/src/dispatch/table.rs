//! Explicit routing from event kind to handler.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::events::{EventKind, InboundEvent, IntegrationEnvelope};
use crate::orchestrator::{HandlerOutcome, Orchestrator};

/// Handles one decoded inbound envelope.
///
/// Implementations must tolerate being called more than once with the same
/// envelope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Applies the envelope.
    async fn handle(&self, envelope: IntegrationEnvelope<InboundEvent>) -> Result<HandlerOutcome>;
}

#[async_trait]
impl EventHandler for Orchestrator {
    async fn handle(&self, envelope: IntegrationEnvelope<InboundEvent>) -> Result<HandlerOutcome> {
        Self::handle(self, envelope).await
    }
}

/// Handlers keyed by [`EventKind`].
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl HandlerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every event kind to the orchestrator.
    #[must_use]
    pub fn for_orchestrator(orchestrator: Orchestrator) -> Self {
        let handler: Arc<dyn EventHandler> = Arc::new(orchestrator);
        EventKind::ALL
            .into_iter()
            .fold(Self::new(), |table, kind| table.with_handler(kind, Arc::clone(&handler)))
    }

    /// Registers a handler, replacing any previous one for the kind.
    #[must_use]
    pub fn with_handler(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Registers a handler in place.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Removes the handler for a kind.
    pub fn unregister(&mut self, kind: EventKind) -> bool {
        self.handlers.remove(&kind).is_some()
    }

    /// Returns true if a handler is registered for the kind.
    #[must_use]
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds in declaration order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(|kind| self.handles(*kind))
            .collect()
    }

    /// Routes the envelope. Unregistered kinds yield [`HandlerOutcome::Unhandled`].
    pub async fn dispatch(&self, envelope: IntegrationEnvelope<InboundEvent>) -> Result<HandlerOutcome> {
        let kind = envelope.data.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler.handle(envelope).await,
            None => {
                debug!(
                    event_kind = %kind,
                    integration_event_id = %envelope.integration_event_id,
                    "No handler registered"
                );
                Ok(HandlerOutcome::Unhandled)
            }
        }
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("kinds", &self.kinds())
            .finish()
    }
}
