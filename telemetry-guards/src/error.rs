//! Guard-internal failures. These are logged, never returned to callers.

use thiserror::Error;

/// Result alias for event construction inside the guards.
pub type GuardResult<T> = Result<T, GuardError>;

/// Reasons a guard could not hand an event to its sink.
#[derive(Debug, Error)]
pub enum GuardError {
    /// No sink is configured.
    #[error("no event sink configured")]
    MissingSink,

    /// A caller-supplied or accumulated value failed validation.
    #[error("failed to build event: {0}")]
    Event(#[from] telemetry_primitives::Error),
}
