//! Dedup bookkeeping for the emission guards.

use std::collections::HashSet;

use telemetry_primitives::FeedbackValue;

use crate::scope::RequestScope;

/// Composite dedup key for event kinds emitted at most once per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GuardKey {
    /// Security block, keyed by `(block_type, rule_id)`.
    Security {
        /// Kind of block.
        block_type: String,
        /// Triggering rule.
        rule_id: String,
    },
    /// Feedback, keyed by `(conversation, turn, value)`.
    Feedback {
        /// Target conversation.
        conversation_id: String,
        /// Target turn.
        turn_id: i64,
        /// Feedback value.
        feedback: FeedbackValue,
    },
}

/// Per-request record of what has already been attempted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmissionGuardState {
    chat_turn_attempted: bool,
    keys: HashSet<GuardKey>,
}

impl EmissionGuardState {
    /// Returns `true` once a chat turn attempt has been made.
    #[must_use]
    pub const fn chat_turn_attempted(&self) -> bool {
        self.chat_turn_attempted
    }

    /// Returns `true` when `key` has already been claimed.
    #[must_use]
    pub fn contains(&self, key: &GuardKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of keys claimed so far.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` when nothing has been claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.chat_turn_attempted && self.keys.is_empty()
    }

    /// Marks the chat turn attempted; returns `true` only for the first call.
    pub fn claim_chat_turn(&mut self) -> bool {
        !std::mem::replace(&mut self.chat_turn_attempted, true)
    }

    /// Records `key`; returns `true` only if it was not yet present.
    pub fn claim_key(&mut self, key: GuardKey) -> bool {
        self.keys.insert(key)
    }
}

impl RequestScope {
    /// Claims the chat turn slot on the current request.
    ///
    /// Returns `None` outside a request scope.
    #[must_use]
    pub fn claim_chat_turn() -> Option<bool> {
        Self::with_current(|state| state.guards.claim_chat_turn())
    }

    /// Claims `key` on the current request.
    ///
    /// Returns `None` outside a request scope.
    #[must_use]
    pub fn claim_key(key: GuardKey) -> Option<bool> {
        Self::with_current(|state| state.guards.claim_key(key))
    }

    /// Returns a copy of the current request's guard state.
    #[must_use]
    pub fn guard_state() -> EmissionGuardState {
        Self::with_current(|state| state.guards.clone()).unwrap_or_default()
    }
}

/// Clears all guard bookkeeping for the current request.
pub fn reset_guards() {
    let _ = RequestScope::with_current(|state| state.guards = EmissionGuardState::default());
}
