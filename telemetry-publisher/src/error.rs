//! Error types for the publisher.

use std::time::Duration;

use telemetry_config::ConfigError;
use thiserror::Error;

use crate::state::{PublisherEvent, PublisherState};

/// Result alias for publisher control operations.
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Result alias for a single delivery attempt.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors raised while constructing or controlling a publisher.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// Configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The collector transport could not be built.
    #[error("collector transport not configured: {reason}")]
    Transport {
        /// Additional context for the failure.
        reason: String,
    },
    /// `start` was called without a tokio runtime.
    #[error("publisher must be started from within a tokio runtime")]
    NoRuntime,
    /// The state machine rejected a transition.
    #[error("invalid publisher transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: PublisherState,
        /// Event that triggered the failure.
        event: PublisherEvent,
    },
}

impl PublisherError {
    /// Convenience constructor for transport build failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}

/// Reasons a delivery attempt failed. All are handled identically.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The envelope could not be serialised.
    #[error("failed to encode envelope: {source}")]
    Encode {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// The attempt exceeded the delivery timeout.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    /// The collector answered with a non-success status.
    #[error("collector returned {status}: {reason}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        reason: String,
    },
    /// Connection or protocol failure.
    #[error("collector transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },
}

impl DeliveryError {
    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }
}
