//! Batching publisher with a background flush loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use telemetry_config::TelemetryConfig;
use telemetry_primitives::{EventId, TelemetryEvent};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, DeliveryResult, PublisherError, PublisherResult};
use crate::queue::EventQueue;
use crate::state::{PublisherEvent, PublisherState};
use crate::stats::{PublisherStats, StatsSnapshot};
use crate::transport::{CollectorTransport, HttpCollector, OutboundBatch};

const DROP_SAMPLE_SIZE: usize = 5;

/// Fire-and-forget destination for finished events.
///
/// The only contract is acceptance: `enqueue` never blocks, never performs
/// I/O, and reports acceptance as a plain boolean.
pub trait EventSink: Send + Sync {
    /// Offers `event`; returns `false` when it was not accepted.
    fn enqueue(&self, event: TelemetryEvent) -> bool;
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued.
    Empty,
    /// The collector acknowledged the batch.
    Delivered {
        /// Events in the batch.
        events: usize,
    },
    /// The batch was dropped after its final attempt.
    Dropped {
        /// Events in the batch.
        events: usize,
    },
}

struct Inner {
    config: TelemetryConfig,
    transport: Option<Arc<dyn CollectorTransport>>,
    queue: EventQueue,
    stats: PublisherStats,
    state: Mutex<PublisherState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    wake: Notify,
    shutdown_signal: Notify,
    shutdown: AtomicBool,
    closed: AtomicBool,
    flush_lock: tokio::sync::Mutex<()>,
}

/// Owns the bounded queue and the background loop that ships it.
///
/// Clones share the same queue and loop.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("enabled", &self.inner.config.enabled())
            .field("state", &self.state())
            .field("queue_len", &self.queue_len())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Publisher {
    /// Creates a publisher that ships batches through `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::Config`] when the configuration is invalid.
    pub fn new(
        config: TelemetryConfig,
        transport: Arc<dyn CollectorTransport>,
    ) -> PublisherResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, Some(transport)))
    }

    /// Creates a publisher from configuration alone, using [`HttpCollector`].
    ///
    /// A disabled configuration yields a publisher that rejects every event.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError`] when the configuration is invalid or the
    /// collector client cannot be built.
    pub fn from_config(config: TelemetryConfig) -> PublisherResult<Self> {
        config.validate()?;
        if !config.enabled() {
            info!("telemetry publishing disabled by configuration");
            return Ok(Self::assemble(config, None));
        }
        let transport: Arc<dyn CollectorTransport> = Arc::new(HttpCollector::new(&config)?);
        Ok(Self::assemble(config, Some(transport)))
    }

    /// Creates a publisher that rejects every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::assemble(TelemetryConfig::default().with_enabled(false), None)
    }

    fn assemble(config: TelemetryConfig, transport: Option<Arc<dyn CollectorTransport>>) -> Self {
        let queue = EventQueue::new(config.max_queue_size());
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                queue,
                stats: PublisherStats::default(),
                state: Mutex::new(PublisherState::Stopped),
                worker: Mutex::new(None),
                wake: Notify::new(),
                shutdown_signal: Notify::new(),
                shutdown: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Returns `true` when events can be accepted.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled() && self.inner.transport.is_some()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> PublisherState {
        *lock(&self.inner.state)
    }

    /// Returns the number of queued events.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Returns the delivery and drop counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Returns the configuration in use.
    #[must_use]
    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    /// Spawns the flush loop. Calling it again while running is a no-op, as is
    /// starting a disabled, stopping, or already stopped publisher.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::NoRuntime`] outside a tokio runtime.
    pub fn start(&self) -> PublisherResult<()> {
        if !self.is_enabled() {
            debug!("publisher disabled; not starting flush loop");
            return Ok(());
        }
        if self.inner.closed.load(Ordering::Acquire) {
            warn!("publisher already stopped; start ignored");
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| PublisherError::NoRuntime)?;

        let mut state = lock(&self.inner.state);
        if state.is_running() {
            return Ok(());
        }
        if *state == PublisherState::Stopping || self.inner.closed.load(Ordering::Acquire) {
            warn!("publisher stopping; start ignored");
            return Ok(());
        }
        *state = state.transition(PublisherEvent::Start)?;

        let inner = Arc::clone(&self.inner);
        let worker = handle.spawn(run_flush_loop(inner));
        *lock(&self.inner.worker) = Some(worker);

        info!(
            batch_size = self.inner.config.batch_size().get(),
            flush_interval_ms = self.inner.config.flush_interval().as_millis(),
            max_queue_size = self.inner.config.max_queue_size().get(),
            "telemetry publisher started"
        );
        Ok(())
    }

    /// Offers an event to the queue without blocking.
    ///
    /// Returns `false` when the publisher is disabled or stopped, or when the
    /// queue is full (the event is dropped and a warning logged).
    pub fn enqueue(&self, event: TelemetryEvent) -> bool {
        let inner = &self.inner;
        if !self.is_enabled() || inner.closed.load(Ordering::Acquire) {
            inner.stats.record_rejected();
            debug!(event_id = %event.event_id(), "publisher not accepting events");
            return false;
        }

        match inner.queue.push(event) {
            Ok(len) => {
                inner.stats.record_accepted();
                if len >= inner.config.batch_size().get() {
                    inner.wake.notify_one();
                }
                true
            }
            Err(event) => {
                inner.stats.record_queue_full();
                warn!(
                    event_id = %event.event_id(),
                    event_type = %event.event_type(),
                    capacity = inner.queue.capacity().get(),
                    "telemetry queue full; dropping event"
                );
                false
            }
        }
    }

    /// Runs one flush cycle immediately, outside the timer.
    pub async fn flush_now(&self) -> FlushOutcome {
        self.inner.flush_cycle(self.inner.config.retry_once()).await
    }

    /// Stops the loop, makes one final attempt for queued events, and closes
    /// the publisher.
    ///
    /// The loop gets the configured shutdown timeout to exit before it is
    /// aborted. Events still queued afterwards are sent in batch-sized chunks,
    /// each attempted exactly once.
    pub async fn stop(&self) {
        {
            let mut state = lock(&self.inner.state);
            match state.transition(PublisherEvent::Stop) {
                Ok(next) => *state = next,
                Err(err) => {
                    debug!(?err, "publisher already stopping");
                    return;
                }
            }
        }
        self.inner.closed.store(true, Ordering::Release);
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.shutdown_signal.notify_one();

        let worker = lock(&self.inner.worker).take();
        if let Some(mut worker) = worker {
            let limit = self.inner.config.shutdown_timeout();
            if timeout(limit, &mut worker).await.is_err() {
                warn!(
                    timeout_ms = limit.as_millis(),
                    "flush loop did not exit in time; cancelling"
                );
                worker.abort();
                let _ = worker.await;
            }
        }

        let mut delivered = 0;
        let mut dropped = 0;
        loop {
            match self.inner.flush_cycle(false).await {
                FlushOutcome::Empty => break,
                FlushOutcome::Delivered { events } => delivered += events,
                FlushOutcome::Dropped { events } => dropped += events,
            }
        }

        {
            let mut state = lock(&self.inner.state);
            if let Ok(next) = state.transition(PublisherEvent::Finish) {
                *state = next;
            }
        }

        let stats = self.stats();
        info!(
            final_delivered = delivered,
            final_dropped = dropped,
            events_delivered = stats.events_delivered,
            events_dropped = stats.events_dropped,
            dropped_queue_full = stats.dropped_queue_full,
            "telemetry publisher stopped"
        );
    }
}

impl EventSink for Publisher {
    fn enqueue(&self, event: TelemetryEvent) -> bool {
        Publisher::enqueue(self, event)
    }
}

impl Inner {
    async fn flush_cycle(&self, allow_retry: bool) -> FlushOutcome {
        let _flushing = self.flush_lock.lock().await;

        let events = self.queue.drain(self.config.batch_size().get());
        if events.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = events.len();

        let Some(transport) = self.transport.as_ref() else {
            let sample: Vec<EventId> = events
                .iter()
                .take(DROP_SAMPLE_SIZE)
                .map(TelemetryEvent::event_id)
                .collect();
            self.stats.record_dropped(count);
            error!(count, ?sample, "no collector transport; dropping batch");
            return FlushOutcome::Dropped { events: count };
        };

        let batch = match OutboundBatch::encode(self.config.source(), events) {
            Ok(batch) => batch,
            Err(err) => {
                self.stats.record_dropped(count);
                error!(?err, count, "failed to encode batch; dropping");
                return FlushOutcome::Dropped { events: count };
            }
        };

        let in_flight = InFlight {
            stats: &self.stats,
            count,
            sample: batch.envelope().sample_ids(DROP_SAMPLE_SIZE),
            settled: false,
        };

        let first = self.attempt(transport.as_ref(), &batch).await;
        let result = match first {
            Ok(()) => Ok(()),
            Err(err) if allow_retry => {
                warn!(
                    ?err,
                    count,
                    retry_in_ms = self.config.retry_delay().as_millis(),
                    "batch delivery failed; retrying once"
                );
                self.stats.record_retry();
                sleep(self.config.retry_delay()).await;
                self.attempt(transport.as_ref(), &batch).await
            }
            Err(err) => Err(err),
        };

        let sample = in_flight.settle();
        match result {
            Ok(()) => {
                self.stats.record_delivered(count);
                debug!(count, "telemetry batch delivered");
                FlushOutcome::Delivered { events: count }
            }
            Err(err) => {
                self.stats.record_dropped(count);
                error!(?err, count, ?sample, "telemetry batch dropped");
                FlushOutcome::Dropped { events: count }
            }
        }
    }

    async fn attempt(
        &self,
        transport: &dyn CollectorTransport,
        batch: &OutboundBatch,
    ) -> DeliveryResult<()> {
        let limit = self.config.delivery_timeout();
        timeout(limit, transport.deliver(batch))
            .await
            .map_err(|_| DeliveryError::Timeout(limit))?
    }
}

/// A batch taken off the queue whose delivery has not finished.
///
/// Dropping it unsettled means the flush was cancelled mid-delivery, which
/// happens when `stop` aborts a stuck loop; the batch is counted as dropped.
struct InFlight<'a> {
    stats: &'a PublisherStats,
    count: usize,
    sample: Vec<EventId>,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self) -> Vec<EventId> {
        self.settled = true;
        std::mem::take(&mut self.sample)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.stats.record_dropped(self.count);
            error!(
                count = self.count,
                sample = ?self.sample,
                "in-flight telemetry batch abandoned"
            );
        }
    }
}

async fn run_flush_loop(inner: Arc<Inner>) {
    let batch_size = inner.config.batch_size().get();
    let mut interval = tokio::time::interval(inner.config.flush_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    while !inner.shutdown.load(Ordering::Acquire) {
        tokio::select! {
            () = inner.shutdown_signal.notified() => break,
            () = inner.wake.notified() => {}
            _ = interval.tick() => {}
        }

        loop {
            if inner.shutdown.load(Ordering::Acquire) {
                break;
            }
            inner.flush_cycle(inner.config.retry_once()).await;
            if inner.queue.len() < batch_size {
                break;
            }
        }
    }

    debug!("flush loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
