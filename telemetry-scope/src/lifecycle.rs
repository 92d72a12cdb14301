//! Request lifecycle hook.
//!
//! The host calls into this module at request start and end. Both points run
//! the same full reset; the end reset is driven by a drop guard so it also
//! happens on error, panic, or cancellation.

use std::future::Future;

use http::HeaderMap;
use telemetry_primitives::RequestContext;
use tracing::{debug, trace};

use crate::scope::RequestScope;

/// Default trace id header.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Default user id header.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Default department id header.
pub const DEPT_ID_HEADER: &str = "x-dept-id";
/// Default conversation id header.
pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";
/// Default turn id header.
pub const TURN_ID_HEADER: &str = "x-turn-id";

/// Inbound header names carrying the correlation identifiers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderNames {
    /// Trace id header.
    pub trace_id: String,
    /// User id header.
    pub user_id: String,
    /// Department id header.
    pub dept_id: String,
    /// Conversation id header.
    pub conversation_id: String,
    /// Turn id header; its value must parse as an integer.
    pub turn_id: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            trace_id: TRACE_ID_HEADER.to_owned(),
            user_id: USER_ID_HEADER.to_owned(),
            dept_id: DEPT_ID_HEADER.to_owned(),
            conversation_id: CONVERSATION_ID_HEADER.to_owned(),
            turn_id: TURN_ID_HEADER.to_owned(),
        }
    }
}

/// Boundary that resets all per-request state at request start and end.
#[derive(Clone, Debug, Default)]
pub struct RequestLifecycle {
    headers: HeaderNames,
}

impl RequestLifecycle {
    /// Creates a hook reading the default header names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the header names.
    #[must_use]
    pub fn with_header_names(mut self, headers: HeaderNames) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the configured header names.
    #[must_use]
    pub fn header_names(&self) -> &HeaderNames {
        &self.headers
    }

    /// Builds a correlation context from inbound headers.
    ///
    /// Missing, empty, or non-UTF-8 values are absent; a turn id that does not
    /// parse as an integer is absent.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> RequestContext {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        };

        let turn_id = text(&self.headers.turn_id).and_then(|raw| match raw.parse::<i64>() {
            Ok(turn) => Some(turn),
            Err(err) => {
                debug!(%raw, ?err, "ignoring unparseable turn id header");
                None
            }
        });

        RequestContext {
            trace_id: text(&self.headers.trace_id),
            user_id: text(&self.headers.user_id),
            dept_id: text(&self.headers.dept_id),
            conversation_id: text(&self.headers.conversation_id),
            turn_id,
        }
    }

    /// Start-of-request hook for the scope already installed on this task.
    ///
    /// Resets metrics and guard state, installs a fresh context, and returns
    /// a guard that performs the end-of-request reset when dropped. Returns
    /// `None` outside a request scope.
    #[must_use]
    pub fn begin(&self, headers: &HeaderMap) -> Option<RequestGuard> {
        let scope = RequestScope::current()?;
        Some(self.begin_in(&scope, headers))
    }

    /// Runs `future` as one request: fresh scope, start reset, end reset.
    pub async fn run<F>(&self, headers: &HeaderMap, future: F) -> F::Output
    where
        F: Future,
    {
        let scope = RequestScope::new();
        let guard = self.begin_in(&scope, headers);
        let output = scope.run(future).await;
        drop(guard);
        output
    }

    fn begin_in(&self, scope: &RequestScope, headers: &HeaderMap) -> RequestGuard {
        let context = self.extract(headers);
        {
            let mut state = scope.lock();
            state.clear();
            state.context = context;
            trace!(context = ?state.context, "request scope opened");
        }
        RequestGuard {
            scope: scope.clone(),
        }
    }
}

/// Performs the end-of-request reset when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard immediately ends the request"]
pub struct RequestGuard {
    scope: RequestScope,
}

impl RequestGuard {
    /// Returns the scope this guard will reset.
    #[must_use]
    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.scope.reset();
        trace!("request scope closed");
    }
}
