//! Task-local request scope.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use telemetry_primitives::RequestContext;
use tokio::task::JoinHandle;

use crate::guard_state::EmissionGuardState;
use crate::metrics::MetricsAccumulator;

tokio::task_local! {
    static ACTIVE_SCOPE: RequestScope;
}

#[derive(Debug, Default)]
pub(crate) struct ScopeState {
    pub(crate) context: RequestContext,
    pub(crate) metrics: MetricsAccumulator,
    pub(crate) guards: EmissionGuardState,
}

impl ScopeState {
    pub(crate) fn clear(&mut self) {
        self.context = RequestContext::empty();
        self.metrics = MetricsAccumulator::default();
        self.guards = EmissionGuardState::default();
    }
}

/// Handle to the state owned by exactly one request.
///
/// Clones share the same state; that is how spawned continuations of a
/// request keep seeing it (see [`RequestScope::spawn`]).
#[derive(Clone, Default)]
pub struct RequestScope {
    state: Arc<Mutex<ScopeState>>,
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("context", &self.lock().context)
            .finish_non_exhaustive()
    }
}

impl RequestScope {
    /// Creates a scope with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scope installed on the current task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        ACTIVE_SCOPE.try_with(Clone::clone).ok()
    }

    /// Returns `true` when called from inside a request scope.
    #[must_use]
    pub fn is_active() -> bool {
        ACTIVE_SCOPE.try_with(|_| ()).is_ok()
    }

    /// Runs `future` with this scope installed.
    pub async fn run<F>(self, future: F) -> F::Output
    where
        F: Future,
    {
        ACTIVE_SCOPE.scope(self, future).await
    }

    /// Runs a synchronous closure with this scope installed.
    pub fn run_sync<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        ACTIVE_SCOPE.sync_scope(self, f)
    }

    /// Binds `future` to the caller's scope, if there is one.
    ///
    /// Task-locals do not follow `tokio::spawn`; wrap continuations with this
    /// (or use [`RequestScope::spawn`]) so they keep their request state.
    pub fn scope_future<F>(future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let current = Self::current();
        async move {
            match current {
                Some(scope) => ACTIVE_SCOPE.scope(scope, future).await,
                None => future.await,
            }
        }
    }

    /// Spawns `future` on the runtime, carrying the caller's scope along.
    pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(Self::scope_future(future))
    }

    /// Clears context, metrics, and guard bookkeeping.
    pub fn reset(&self) {
        self.lock().clear();
    }

    /// Returns a copy of the installed correlation context.
    #[must_use]
    pub fn context(&self) -> RequestContext {
        self.lock().context.clone()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the current task's scope state.
    ///
    /// Returns `None` outside a scope. The lock is never held across an
    /// await point.
    pub(crate) fn with_current<R>(f: impl FnOnce(&mut ScopeState) -> R) -> Option<R> {
        ACTIVE_SCOPE
            .try_with(|scope| {
                let mut state = scope.lock();
                f(&mut state)
            })
            .ok()
    }
}
