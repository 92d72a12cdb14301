//! Shared error definitions for telemetry primitives.

use thiserror::Error;

/// Result alias used throughout the telemetry crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing telemetry values.
#[derive(Debug, Error)]
pub enum Error {
    /// A payload label failed validation.
    #[error("invalid label `{value}`: {reason}")]
    InvalidLabel {
        /// The offending value, truncated for logging.
        value: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A numeric payload field was out of range.
    #[error("invalid payload field `{field}`: {reason}")]
    InvalidPayload {
        /// Name of the rejected field.
        field: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A correlation field required by the event kind was absent.
    #[error("missing correlation field `{field}`")]
    MissingCorrelation {
        /// Name of the absent field.
        field: &'static str,
    },

    /// Feedback value outside the supported set.
    #[error("unsupported feedback value `{0}`")]
    UnknownFeedback(String),
}

impl Error {
    /// Helper to construct payload errors from string-like reasons.
    #[must_use]
    pub fn invalid_payload(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            field,
            reason: reason.into(),
        }
    }
}
