//! Event publisher trait and implementations.

use async_trait::async_trait;
use tracing::{debug, info, Level};

use super::{IntegrationEnvelope, OutboundEvent};
use crate::errors::TransportError;

/// Hands outbound events to the message broker.
///
/// Delivery is at-least-once and not coupled to the transaction that
/// produced the event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event on its topic.
    async fn publish(&self, envelope: IntegrationEnvelope<OutboundEvent>) -> Result<(), TransportError>;
}

/// A publisher that discards all events.
///
/// Used as the default when no broker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPublisher;

#[async_trait]
impl EventPublisher for NoOpPublisher {
    async fn publish(&self, _envelope: IntegrationEnvelope<OutboundEvent>) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A publisher that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingPublisher {
    level: Level,
}

impl Default for LoggingPublisher {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingPublisher {
    /// Creates a new logging publisher with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging publisher.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventPublisher for LoggingPublisher {
    async fn publish(&self, envelope: IntegrationEnvelope<OutboundEvent>) -> Result<(), TransportError> {
        let topic = envelope.data.topic();
        if self.level == Level::DEBUG {
            debug!(
                topic,
                integration_event_id = %envelope.integration_event_id,
                event_data = ?envelope.data,
                "Event: {}", topic
            );
        } else {
            info!(
                topic,
                integration_event_id = %envelope.integration_event_id,
                event_data = ?envelope.data,
                "Event: {}", topic
            );
        }
        Ok(())
    }
}

/// A publisher that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingPublisher {
    events: parking_lot::RwLock<Vec<IntegrationEnvelope<OutboundEvent>>>,
}

impl CollectingPublisher {
    /// Creates a new collecting publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected envelopes.
    #[must_use]
    pub fn envelopes(&self) -> Vec<IntegrationEnvelope<OutboundEvent>> {
        self.events.read().clone()
    }

    /// Returns all collected events without envelopes.
    #[must_use]
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.read().iter().map(|e| e.data.clone()).collect()
    }

    /// Returns the events published on a topic.
    #[must_use]
    pub fn events_on(&self, topic: &str) -> Vec<OutboundEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.data.topic() == topic)
            .map(|e| e.data.clone())
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish(&self, envelope: IntegrationEnvelope<OutboundEvent>) -> Result<(), TransportError> {
        self.events.write().push(envelope);
        Ok(())
    }
}
