//! The three emission guards and the sink they hand events to.
//!
//! A guard claims its dedup key in the request scope before building the
//! event, so a failed build or a refused enqueue still counts as the one
//! attempt for that key.

use std::fmt;
use std::sync::Arc;

use telemetry_primitives::{
    FeedbackPayload, FeedbackValue, Label, RequestContext, SecurityPayload, TelemetryEvent,
};
use telemetry_publisher::EventSink;
use telemetry_scope::{GuardKey, RequestScope, get_context, snapshot_metrics};
use tracing::{debug, warn};

use crate::error::{GuardError, GuardResult};
use crate::fields::ChatTurnFields;

/// What a guard call did. Purely informational; callers may ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The sink accepted the event.
    Emitted,
    /// The event was built but the sink refused it (queue full or disabled).
    Rejected,
    /// This kind (or key) was already attempted in the current request.
    Duplicate,
    /// Required correlation fields were absent, or no request scope is active.
    MissingContext,
    /// The event could not be built or no sink is configured.
    Failed,
}

impl EmitOutcome {
    /// Returns `true` when the event reached the sink.
    #[must_use]
    pub const fn is_emitted(self) -> bool {
        matches!(self, Self::Emitted)
    }
}

/// Deduplicating front door to an [`EventSink`].
///
/// Every method claims its dedup slot in the current request before doing
/// anything else, so at most one attempt is made per slot per request no
/// matter how the attempt ends.
#[derive(Clone, Default)]
pub struct EmissionGuards {
    sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for EmissionGuards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmissionGuards")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl EmissionGuards {
    /// Creates guards that emit into `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates guards with no sink; every first attempt ends as
    /// [`EmitOutcome::Failed`].
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Emits the chat turn event for the current request at most once.
    ///
    /// Requires trace, user, dept, conversation and turn ids in the request
    /// context. Latency total and retrieval statistics come from the metrics
    /// accumulator.
    pub fn emit_chat_turn_once(&self, fields: ChatTurnFields) -> EmitOutcome {
        match RequestScope::claim_chat_turn() {
            None => return outside_scope("chat_turn"),
            Some(false) => {
                debug!("chat turn already attempted for this request");
                return EmitOutcome::Duplicate;
            }
            Some(true) => {}
        }

        let context = get_context();
        if let Err(err) = context.require_turn() {
            debug!(%err, "dropping chat turn event; correlation incomplete");
            return EmitOutcome::MissingContext;
        }

        let metrics = snapshot_metrics();
        self.dispatch("chat_turn", || {
            let payload = fields.into_payload(&metrics)?;
            Ok(TelemetryEvent::new(&context, payload)?)
        })
    }

    /// Emits a security block event at most once per `(block_type, rule_id)`
    /// in the current request.
    pub fn emit_security_event_once(&self, block_type: &str, rule_id: &str) -> EmitOutcome {
        let key = GuardKey::Security {
            block_type: block_type.to_owned(),
            rule_id: rule_id.to_owned(),
        };
        let context = match claim(key, "security") {
            Ok(context) => context,
            Err(outcome) => return outcome,
        };

        self.dispatch("security", || {
            let payload = SecurityPayload {
                block_type: Label::new(block_type)?,
                blocked: true,
                rule_id: Label::new(rule_id)?,
            };
            Ok(TelemetryEvent::new(&context, payload)?)
        })
    }

    /// Emits a feedback event at most once per
    /// `(target_conversation_id, target_turn_id, feedback)` in the current
    /// request.
    pub fn emit_feedback_event_once(
        &self,
        feedback: FeedbackValue,
        target_conversation_id: &str,
        target_turn_id: i64,
    ) -> EmitOutcome {
        let key = GuardKey::Feedback {
            conversation_id: target_conversation_id.to_owned(),
            turn_id: target_turn_id,
            feedback,
        };
        let context = match claim(key, "feedback") {
            Ok(context) => context,
            Err(outcome) => return outcome,
        };

        self.dispatch("feedback", || {
            let payload = FeedbackPayload {
                feedback,
                target_conversation_id: target_conversation_id.to_owned(),
                target_turn_id,
            };
            Ok(TelemetryEvent::new(&context, payload)?)
        })
    }

    fn dispatch(
        &self,
        kind: &'static str,
        build: impl FnOnce() -> GuardResult<TelemetryEvent>,
    ) -> EmitOutcome {
        let result = self
            .sink
            .as_ref()
            .ok_or(GuardError::MissingSink)
            .and_then(|sink| build().map(|event| (sink, event)));

        match result {
            Ok((sink, event)) => {
                let event_id = event.event_id();
                if sink.enqueue(event) {
                    debug!(kind, %event_id, "telemetry event enqueued");
                    EmitOutcome::Emitted
                } else {
                    debug!(kind, %event_id, "telemetry event not accepted");
                    EmitOutcome::Rejected
                }
            }
            Err(err) => {
                warn!(kind, %err, "telemetry event not emitted");
                EmitOutcome::Failed
            }
        }
    }
}

/// Claims `key` and loads the identity-complete context, or returns the
/// outcome that ends the attempt early.
fn claim(key: GuardKey, kind: &'static str) -> Result<RequestContext, EmitOutcome> {
    match RequestScope::claim_key(key) {
        None => return Err(outside_scope(kind)),
        Some(false) => {
            debug!(kind, "telemetry event already attempted for this key");
            return Err(EmitOutcome::Duplicate);
        }
        Some(true) => {}
    }

    let context = get_context();
    if let Err(err) = context.require_identity() {
        debug!(kind, %err, "dropping telemetry event; correlation incomplete");
        return Err(EmitOutcome::MissingContext);
    }
    Ok(context)
}

fn outside_scope(kind: &'static str) -> EmitOutcome {
    debug!(kind, "no active request scope; dropping telemetry event");
    EmitOutcome::MissingContext
}
