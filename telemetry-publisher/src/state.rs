//! Publisher state machine: `stopped -> running -> stopping -> stopped`.

use tracing::debug;

use crate::error::{PublisherError, PublisherResult};

/// States the publisher can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// No flush loop is running.
    Stopped,
    /// The flush loop is running.
    Running,
    /// Shutdown in progress: loop exiting, final flush pending.
    Stopping,
}

impl PublisherState {
    /// Returns `true` while the flush loop is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Events that trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherEvent {
    /// Spawn the flush loop.
    Start,
    /// Begin shutdown.
    Stop,
    /// Shutdown finished.
    Finish,
}

impl PublisherState {
    /// Applies `event`, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`PublisherError::InvalidTransition`] when `event` is not
    /// allowed from this state.
    pub fn transition(self, event: PublisherEvent) -> PublisherResult<Self> {
        let next = match (self, event) {
            (Self::Stopped, PublisherEvent::Start) => Self::Running,
            (Self::Running | Self::Stopped, PublisherEvent::Stop) => Self::Stopping,
            (Self::Stopping, PublisherEvent::Finish) => Self::Stopped,
            _ => {
                return Err(PublisherError::InvalidTransition { from: self, event });
            }
        };
        if next != self {
            debug!(from = ?self, to = ?next, ?event, "publisher state transition");
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle() {
        let state = PublisherState::Stopped
            .transition(PublisherEvent::Start)
            .unwrap();
        assert!(state.is_running());
        let state = state.transition(PublisherEvent::Stop).unwrap();
        assert_eq!(state, PublisherState::Stopping);
        let state = state.transition(PublisherEvent::Finish).unwrap();
        assert_eq!(state, PublisherState::Stopped);
    }

    #[test]
    fn stop_without_start_still_finishes() {
        let state = PublisherState::Stopped
            .transition(PublisherEvent::Stop)
            .unwrap();
        assert_eq!(state, PublisherState::Stopping);
    }

    #[test]
    fn invalid_transitions_error() {
        let err = PublisherState::Running
            .transition(PublisherEvent::Start)
            .expect_err("double start");
        assert!(matches!(err, PublisherError::InvalidTransition { .. }));
        assert!(
            PublisherState::Stopping
                .transition(PublisherEvent::Start)
                .is_err()
        );
    }
}
