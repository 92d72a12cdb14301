//! Batch envelope shipped to the collector.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::TelemetryEvent;
use crate::ids::EventId;

/// One delivery unit: an ordered batch of events plus sender metadata.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEnvelope {
    source: String,
    sent_at: DateTime<Utc>,
    events: Vec<TelemetryEvent>,
}

impl TelemetryEnvelope {
    /// Wraps a drained batch, stamping the send time.
    #[must_use]
    pub fn new(source: impl Into<String>, events: Vec<TelemetryEvent>) -> Self {
        Self {
            source: source.into(),
            sent_at: Utc::now(),
            events,
        }
    }

    /// Returns the sending process identifier.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the time the envelope was built.
    #[must_use]
    pub const fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// Returns the events in FIFO order.
    #[must_use]
    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    /// Number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` when the envelope carries no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns up to `limit` event ids, for log sampling.
    #[must_use]
    pub fn sample_ids(&self, limit: usize) -> Vec<EventId> {
        self.events
            .iter()
            .take(limit)
            .map(TelemetryEvent::event_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Label, RequestContext, SecurityPayload};

    fn event() -> TelemetryEvent {
        let ctx = RequestContext::empty()
            .with_trace_id("t")
            .with_user_id("u")
            .with_dept_id("d");
        TelemetryEvent::new(
            &ctx,
            SecurityPayload {
                block_type: Label::new("pii").unwrap(),
                blocked: true,
                rule_id: Label::new("r1").unwrap(),
            },
        )
        .unwrap()
    }

    #[test]
    fn serializes_envelope_fields() {
        let envelope = TelemetryEnvelope::new("chat-service", vec![event(), event()]);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["source"], "chat-service");
        assert!(value["sentAt"].is_string());
        assert_eq!(value["events"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn sample_ids_are_bounded_and_ordered() {
        let events: Vec<_> = (0..7).map(|_| event()).collect();
        let first = events[0].event_id();
        let envelope = TelemetryEnvelope::new("svc", events);
        let sample = envelope.sample_ids(5);
        assert_eq!(sample.len(), 5);
        assert_eq!(sample[0], first);
        assert_eq!(envelope.len(), 7);
    }
}
