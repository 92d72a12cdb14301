//! Delivery and drop counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters describing what happened to enqueued events.
#[derive(Debug, Default)]
pub struct PublisherStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    dropped_queue_full: AtomicU64,
    batches_delivered: AtomicU64,
    events_delivered: AtomicU64,
    batches_dropped: AtomicU64,
    events_dropped: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`PublisherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events accepted into the queue.
    pub accepted: u64,
    /// Events refused because the publisher was disabled or closed.
    pub rejected: u64,
    /// Events dropped because the queue was full.
    pub dropped_queue_full: u64,
    /// Batches the collector acknowledged.
    pub batches_delivered: u64,
    /// Events inside acknowledged batches.
    pub events_delivered: u64,
    /// Batches dropped after their final attempt.
    pub batches_dropped: u64,
    /// Events inside dropped batches.
    pub events_dropped: u64,
    /// Second attempts made after a failed first attempt.
    pub retries: u64,
}

fn bump(counter: &AtomicU64, by: usize) {
    counter.fetch_add(by as u64, Ordering::Relaxed);
}

impl PublisherStats {
    pub(crate) fn record_accepted(&self) {
        bump(&self.accepted, 1);
    }

    pub(crate) fn record_rejected(&self) {
        bump(&self.rejected, 1);
    }

    pub(crate) fn record_queue_full(&self) {
        bump(&self.dropped_queue_full, 1);
    }

    pub(crate) fn record_delivered(&self, events: usize) {
        bump(&self.batches_delivered, 1);
        bump(&self.events_delivered, events);
    }

    pub(crate) fn record_dropped(&self, events: usize) {
        bump(&self.batches_dropped, 1);
        bump(&self.events_dropped, events);
    }

    pub(crate) fn record_retry(&self) {
        bump(&self.retries, 1);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped_queue_full: self.dropped_queue_full.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
