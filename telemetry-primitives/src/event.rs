//! Immutable telemetry events.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::ids::EventId;
use crate::payload::EventPayload;

/// Closed set of event kinds understood by the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// One completed chat turn.
    ChatTurn,
    /// A request blocked by a security rule.
    Security,
    /// User feedback on an earlier turn.
    Feedback,
}

impl EventType {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatTurn => "CHAT_TURN",
            Self::Security => "SECURITY",
            Self::Feedback => "FEEDBACK",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single telemetry event. Never mutated after construction.
///
/// Only [`TelemetryEvent::new`] builds one, which keeps `eventType` in step
/// with the payload; the type is encode-only.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    event_id: EventId,
    event_type: EventType,
    trace_id: String,
    conversation_id: Option<String>,
    turn_id: Option<i64>,
    user_id: String,
    dept_id: String,
    occurred_at: DateTime<Utc>,
    payload: EventPayload,
}

impl TelemetryEvent {
    /// Builds an event from the request's correlation context.
    ///
    /// Every kind needs trace, user, and department ids; chat turns also need
    /// the conversation and turn ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCorrelation`] when a required field is absent.
    pub fn new(context: &RequestContext, payload: impl Into<EventPayload>) -> Result<Self> {
        let payload = payload.into();
        let event_type = payload.event_type();
        match event_type {
            EventType::ChatTurn => context.require_turn()?,
            EventType::Security | EventType::Feedback => context.require_identity()?,
        }

        Ok(Self {
            event_id: EventId::random(),
            event_type,
            trace_id: required(context.trace_id.as_deref(), "traceId")?,
            conversation_id: context.conversation_id.clone(),
            turn_id: context.turn_id,
            user_id: required(context.user_id.as_deref(), "userId")?,
            dept_id: required(context.dept_id.as_deref(), "deptId")?,
            occurred_at: Utc::now(),
            payload,
        })
    }

    /// Returns the unique event identifier.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Returns the event kind.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the trace identifier.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Returns the conversation identifier, if any.
    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Returns the turn number, if any.
    #[must_use]
    pub const fn turn_id(&self) -> Option<i64> {
        self.turn_id
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the department identifier.
    #[must_use]
    pub fn dept_id(&self) -> &str {
        &self.dept_id
    }

    /// Returns the time the event was constructed.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }
}

fn required(value: Option<&str>, field: &'static str) -> Result<String> {
    value
        .map(str::to_owned)
        .ok_or(Error::MissingCorrelation { field })
}
