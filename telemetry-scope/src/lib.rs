//! Per-request telemetry state bound to the request's execution.
//!
//! A [`RequestScope`] is installed as a tokio task-local for the duration of
//! one request. The context store, metrics accumulator, and guard bookkeeping
//! all read and write through it, so concurrently interleaved requests never
//! observe each other's state. Outside a scope, getters return empty values
//! and setters are no-ops.

#![warn(missing_docs, clippy::pedantic)]

pub mod context;
pub mod guard_state;
pub mod lifecycle;
pub mod metrics;
mod scope;

pub use context::{get_context, reset_context, set_context};
pub use guard_state::{EmissionGuardState, GuardKey, reset_guards};
pub use lifecycle::{HeaderNames, RequestGuard, RequestLifecycle};
pub use metrics::{
    LatencyBreakdown, MetricsAccumulator, RetrievalStats, ScoredChunk, get_latency, get_rag_info,
    reset_all_metrics, set_latency, set_rag_info, set_total_latency, snapshot_metrics,
};
pub use scope::RequestScope;
pub use telemetry_primitives::RequestContext;
