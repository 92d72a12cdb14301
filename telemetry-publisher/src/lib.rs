//! Asynchronous batching publisher for telemetry events.
//!
//! Producers hand events to [`Publisher::enqueue`], which never blocks and
//! never performs I/O. A background loop drains the bounded queue in FIFO
//! batches and ships each batch to the collector, retrying once before
//! dropping it.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod publisher;
mod queue;
mod state;
mod stats;
mod transport;

pub use error::{DeliveryError, DeliveryResult, PublisherError, PublisherResult};
pub use publisher::{EventSink, FlushOutcome, Publisher};
pub use state::{PublisherEvent, PublisherState};
pub use stats::{PublisherStats, StatsSnapshot};
pub use transport::{CollectorTransport, HttpCollector, OutboundBatch};
