//! Request context store.

use telemetry_primitives::RequestContext;
use tracing::debug;

use crate::scope::RequestScope;

/// Installs `context` for the remainder of the current request.
///
/// Outside a request scope this is a no-op.
pub fn set_context(context: RequestContext) {
    if RequestScope::with_current(|state| state.context = context).is_none() {
        debug!("set_context called outside a request scope; ignored");
    }
}

/// Returns the installed context, or an all-empty one when none is installed.
#[must_use]
pub fn get_context() -> RequestContext {
    RequestScope::with_current(|state| state.context.clone()).unwrap_or_default()
}

/// Clears the installed context back to empty.
pub fn reset_context() {
    let _ = RequestScope::with_current(|state| state.context = RequestContext::empty());
}
