//! Bounded FIFO of pending events.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use telemetry_primitives::TelemetryEvent;

/// Bounded queue owned by the publisher.
///
/// Producers append through [`push`](Self::push); only the flush path drains.
/// Critical sections are a single `VecDeque` operation, so callers on the
/// request path never wait on I/O.
#[derive(Debug)]
pub(crate) struct EventQueue {
    capacity: NonZeroUsize,
    entries: Mutex<VecDeque<TelemetryEvent>>,
}

impl EventQueue {
    pub(crate) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Appends `event`, returning the new length, or hands the event back
    /// when the queue is full.
    #[allow(clippy::result_large_err)]
    pub(crate) fn push(&self, event: TelemetryEvent) -> Result<usize, TelemetryEvent> {
        let mut entries = self.lock();
        if entries.len() >= self.capacity.get() {
            return Err(event);
        }
        entries.push_back(event);
        Ok(entries.len())
    }

    /// Removes up to `max` events from the front.
    pub(crate) fn drain(&self, max: usize) -> Vec<TelemetryEvent> {
        let mut entries = self.lock();
        let take = max.min(entries.len());
        entries.drain(..take).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TelemetryEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_primitives::{Label, RequestContext, SecurityPayload};

    fn event(rule: &str) -> TelemetryEvent {
        let ctx = RequestContext::empty()
            .with_trace_id("t")
            .with_user_id("u")
            .with_dept_id("d");
        TelemetryEvent::new(
            &ctx,
            SecurityPayload {
                block_type: Label::new("pii").unwrap(),
                blocked: true,
                rule_id: Label::new(rule).unwrap(),
            },
        )
        .unwrap()
    }

    #[test]
    fn rejects_when_full() {
        let queue = EventQueue::new(NonZeroUsize::new(2).unwrap());
        assert_eq!(queue.push(event("a")).unwrap(), 1);
        assert_eq!(queue.push(event("b")).unwrap(), 2);
        let rejected = queue.push(event("c")).unwrap_err();
        assert_eq!(rejected.event_type(), telemetry_primitives::EventType::Security);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = EventQueue::new(NonZeroUsize::new(8).unwrap());
        let first = event("a");
        let first_id = first.event_id();
        queue.push(first).unwrap();
        queue.push(event("b")).unwrap();
        queue.push(event("c")).unwrap();

        let batch = queue.drain(2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].event_id(), first_id);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(10).len(), 1);
        assert!(queue.drain(10).is_empty());
    }
}
