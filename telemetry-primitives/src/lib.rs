//! Core shared types for request-scoped telemetry.

#![warn(missing_docs, clippy::pedantic)]

mod context;
mod envelope;
mod error;
mod event;
mod ids;
mod label;
mod payload;

/// Correlation identifiers tying an event back to the request that produced it.
pub use context::RequestContext;
/// Batch wrapper shipped to the collector in one delivery call.
pub use envelope::TelemetryEnvelope;
/// Error type and result alias shared across the telemetry crates.
pub use error::{Error, Result};
/// Immutable telemetry events and their closed set of kinds.
pub use event::{EventType, TelemetryEvent};
/// Globally unique event identifier.
pub use ids::EventId;
/// Validated structured label used for every string payload field.
pub use label::Label;
/// Per-kind payload schemas.
pub use payload::{
    ChatTurnPayload, EventPayload, FeedbackPayload, FeedbackValue, RagInfo, RagSource,
    SecurityPayload,
};
