//! Request-scoped telemetry for chat services.
//!
//! Bundles the pipeline crates behind feature flags. A typical host installs
//! a [`scope::RequestLifecycle`] around every request, builds one
//! [`publisher::Publisher`] per process, and routes signals through
//! [`guards::EmissionGuards`].

#![warn(missing_docs, clippy::pedantic)]

/// Event model shared by every component.
pub use telemetry_primitives as primitives;

/// Collector and queue configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use telemetry_config as config;

/// Request scope, context store, metrics accumulator, and lifecycle hook
/// (enabled by `scope` feature).
#[cfg(feature = "scope")]
pub use telemetry_scope as scope;

/// Batching publisher and collector transport (enabled by `publisher` feature).
#[cfg(feature = "publisher")]
pub use telemetry_publisher as publisher;

/// Deduplicating emission guards (enabled by `guards` feature).
#[cfg(feature = "guards")]
pub use telemetry_guards as guards;
