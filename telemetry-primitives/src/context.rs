//! Correlation context value type.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Correlation identifiers for a single inbound request.
///
/// Every field is optional: the lifecycle hook fills whatever the inbound
/// headers carried, and each event kind decides which fields it requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Distributed trace identifier.
    pub trace_id: Option<String>,
    /// Authenticated user identifier.
    pub user_id: Option<String>,
    /// Department the user belongs to.
    pub dept_id: Option<String>,
    /// Conversation the request belongs to.
    pub conversation_id: Option<String>,
    /// Turn number within the conversation.
    pub turn_id: Option<i64>,
}

impl RequestContext {
    /// Returns an all-empty context.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` when no field is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trace_id.is_none()
            && self.user_id.is_none()
            && self.dept_id.is_none()
            && self.conversation_id.is_none()
            && self.turn_id.is_none()
    }

    /// Sets the trace identifier.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the user identifier.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the department identifier.
    #[must_use]
    pub fn with_dept_id(mut self, dept_id: impl Into<String>) -> Self {
        self.dept_id = Some(dept_id.into());
        self
    }

    /// Sets the conversation identifier.
    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Sets the turn number.
    #[must_use]
    pub fn with_turn_id(mut self, turn_id: i64) -> Self {
        self.turn_id = Some(turn_id);
        self
    }

    /// Returns the first field a security or feedback event needs but lacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCorrelation`] naming the absent field.
    pub fn require_identity(&self) -> Result<()> {
        require(self.trace_id.as_deref(), "traceId")?;
        require(self.user_id.as_deref(), "userId")?;
        require(self.dept_id.as_deref(), "deptId")?;
        Ok(())
    }

    /// Returns the first field a chat-turn event needs but lacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCorrelation`] naming the absent field.
    pub fn require_turn(&self) -> Result<()> {
        self.require_identity()?;
        require(self.conversation_id.as_deref(), "conversationId")?;
        if self.turn_id.is_none() {
            return Err(Error::MissingCorrelation { field: "turnId" });
        }
        Ok(())
    }
}

fn require(value: Option<&str>, field: &'static str) -> Result<()> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(Error::MissingCorrelation { field }),
    }
}
