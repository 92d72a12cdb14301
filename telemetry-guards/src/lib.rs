//! Emission guards: the single call sites business logic uses to "maybe emit".
//!
//! Each guard reads the current request's correlation context, consults the
//! per-request dedup bookkeeping, and hands at most one event per key to an
//! [`EventSink`]. Guards never block and never return errors; the
//! [`EmitOutcome`] they return is informational only.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod fields;
mod guards;

pub use error::{GuardError, GuardResult};
pub use fields::ChatTurnFields;
pub use guards::{EmissionGuards, EmitOutcome};
pub use telemetry_publisher::EventSink;
