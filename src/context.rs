//! Request-scoped context propagation (spec §9 "Request context
//! propagation"). Server actions and API handlers need access to the
//! current request without it being threaded through every call in user
//! code. We're on a thread-based cooperative runtime (tokio), so this is
//! implemented with `tokio::task_local!` — a per-task slot rather than a
//! global, so concurrent requests never see each other's context.

use axum::http::{HeaderMap, Method};
use std::sync::Arc;

/// The subset of a request's identity that user code (server actions,
/// middleware) may read back out of task-local storage.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
}

/// Run `f` with `ctx` installed as the current request's context for the
/// duration of the future. Every request-handling task must be spawned
/// through this so that nested calls (middleware, handler, server
/// action) can recover the context without parameter passing.
pub async fn scope<F, T>(ctx: RequestContext, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT.scope(Arc::new(ctx), f).await
}

/// Retrieve the current request's context. Panics if called outside a
/// task started with [`scope`] — this is intentional: a bug that reads
/// request state with no request in flight is a programming error, not a
/// recoverable condition.
pub fn current() -> Arc<RequestContext> {
    CURRENT.with(|ctx| ctx.clone())
}

/// Retrieve the current request's context, or `None` outside a request
/// task, for call sites that may legitimately run without one (e.g.
/// module-load-time code in a server action file).
pub fn try_current() -> Option<Arc<RequestContext>> {
    CURRENT.try_with(|ctx| ctx.clone()).ok()
}
