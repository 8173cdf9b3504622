//! Span attributes for event handling.
//!
//! Every inbound event is handled inside a `handle_event` span carrying the
//! event kind and the integration event id, so all log lines emitted by a
//! handler (and by the outbox publish after commit) can be correlated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::events::EventKind;

/// Span attributes for one handler invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSpanAttributes {
    /// Kind of the inbound event.
    pub event_kind: EventKind,
    /// Envelope identity used as the idempotency key.
    pub integration_event_id: Uuid,
    /// Delivery attempt, starting at 1.
    pub attempt: Option<u32>,
    /// Handler outcome once known.
    pub outcome: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error code if the handler failed.
    pub error_code: Option<String>,
}

impl HandlerSpanAttributes {
    /// Creates attributes for an event.
    #[must_use]
    pub fn new(event_kind: EventKind, integration_event_id: Uuid) -> Self {
        Self {
            event_kind,
            integration_event_id,
            attempt: None,
            outcome: None,
            duration_ms: None,
            error_code: None,
        }
    }

    /// Sets the delivery attempt.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Opens the `handle_event` span.
    #[must_use]
    pub fn span(&self) -> ::tracing::Span {
        ::tracing::info_span!(
            "handle_event",
            event_kind = %self.event_kind,
            integration_event_id = %self.integration_event_id,
            attempt = self.attempt,
        )
    }

    /// Converts to OpenTelemetry attributes.
    #[must_use]
    pub fn to_otel_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();

        attrs.insert("event.kind".to_string(), self.event_kind.topic().to_string());
        attrs.insert(
            "event.integration_id".to_string(),
            self.integration_event_id.to_string(),
        );

        if let Some(v) = self.attempt {
            attrs.insert("event.attempt".to_string(), v.to_string());
        }
        if let Some(ref v) = self.outcome {
            attrs.insert("handler.outcome".to_string(), v.clone());
        }
        if let Some(v) = self.duration_ms {
            attrs.insert("handler.duration_ms".to_string(), v.to_string());
        }
        if let Some(ref v) = self.error_code {
            attrs.insert("handler.error_code".to_string(), v.clone());
        }

        attrs
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_span_attributes() {
        let id = Uuid::new_v4();
        let attrs = HandlerSpanAttributes::new(EventKind::StageCompleted, id)
            .with_attempt(2)
            .with_outcome("applied")
            .with_duration_ms(12.5);

        let otel = attrs.to_otel_attributes();
        assert_eq!(
            otel.get("event.kind"),
            Some(&"orchestrator.stage-completed".to_string())
        );
        assert_eq!(otel.get("event.integration_id"), Some(&id.to_string()));
        assert_eq!(otel.get("event.attempt"), Some(&"2".to_string()));
        assert_eq!(otel.get("handler.outcome"), Some(&"applied".to_string()));
        assert_eq!(otel.get("handler.duration_ms"), Some(&"12.5".to_string()));
        assert!(!otel.contains_key("handler.error_code"));
    }

    #[test]
    fn test_span_without_subscriber_is_usable() {
        let attrs = HandlerSpanAttributes::new(EventKind::ApplicationSubmitted, Uuid::new_v4());
        let span = attrs.span();
        span.in_scope(|| ::tracing::info!("inside"));
    }

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("test_span");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "test_span");
        let duration = timer.finish();
        assert!(duration >= 10.0);
    }
}
