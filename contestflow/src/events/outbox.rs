//! Events collected inside a transaction and published after commit.

use tracing::{debug, warn};

use super::{EventPublisher, IntegrationEnvelope, OutboundEvent};

/// Outbound events produced by one unit of work.
///
/// Nothing is published until the transaction has committed; a rolled-back
/// transaction drops its outbox.
#[derive(Debug, Default)]
pub struct Outbox {
    events: Vec<OutboundEvent>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event.
    pub fn push(&mut self, event: impl Into<OutboundEvent>) {
        self.events.push(event.into());
    }

    /// Returns the queued events.
    #[must_use]
    pub fn events(&self) -> &[OutboundEvent] {
        &self.events
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Publishes every queued event, logging transport failures.
    ///
    /// Returns the number of events that could not be handed to the broker.
    /// Failures never propagate: the committed state is the source of truth.
    pub async fn publish_best_effort(self, publisher: &dyn EventPublisher) -> usize {
        let mut failed = 0;
        for event in self.events {
            let topic = event.topic();
            let envelope = IntegrationEnvelope::fresh(event);
            let event_id = envelope.integration_event_id;
            match publisher.publish(envelope).await {
                Ok(()) => debug!(topic, %event_id, "Published outbound event"),
                Err(err) => {
                    failed += 1;
                    warn!(topic, %event_id, error = %err, "Outbound event not delivered");
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use crate::events::{CollectingPublisher, MockEventPublisher, StageStarted};
    use uuid::Uuid;

    fn started() -> StageStarted {
        StageStarted {
            procedure_instance_id: Uuid::new_v4(),
            contest_instance_id: None,
            application_instance_id: None,
            stage_id: Uuid::new_v4(),
            stage_type: "Setup".to_string(),
            executor_name: "svc".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publishes_in_order() {
        let publisher = CollectingPublisher::new();
        let mut outbox = Outbox::new();
        outbox.push(started());
        outbox.push(started());
        assert_eq!(outbox.len(), 2);

        let failed = outbox.publish_best_effort(&publisher).await;
        assert_eq!(failed, 0);
        assert_eq!(publisher.len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failures_are_counted_not_raised() {
        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .times(2)
            .returning(|envelope| Err(TransportError::new(envelope.data.topic(), "connection refused")));

        let mut outbox = Outbox::new();
        outbox.push(started());
        outbox.push(started());
        assert_eq!(outbox.publish_best_effort(&publisher).await, 2);
    }
}
