//! Scoped trace-id propagation.
//!
//! A trace id is visible to the call chain that opened its scope and to
//! nothing else. Async scopes ride on a Tokio task-local and therefore
//! follow the future across worker threads; synchronous scopes push onto a
//! thread-local stack for the duration of a closure. Every scope carries a
//! sequence number so that, when both kinds are active, the most recently
//! opened (innermost) one wins.

use std::cell::RefCell;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TraceScope {
    seq: u64,
    id: Arc<str>,
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static TASK_SCOPE: TraceScope;
}

thread_local! {
    static SYNC_SCOPES: RefCell<Vec<TraceScope>> = const { RefCell::new(Vec::new()) };
}

impl TraceScope {
    fn new(id: impl Into<String>) -> Self {
        TraceScope {
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            id: Arc::from(id.into()),
        }
    }
}

/// Fresh random identifier suitable for a new trace.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Trace id of the innermost active scope, if any.
pub fn current_trace_id() -> Option<String> {
    let task = TASK_SCOPE.try_with(|s| s.clone()).ok();
    let sync = SYNC_SCOPES.with(|stack| stack.borrow().last().cloned());

    let scope = match (task, sync) {
        (Some(t), Some(s)) => {
            if s.seq > t.seq {
                s
            } else {
                t
            }
        }
        (Some(t), None) => t,
        (None, Some(s)) => s,
        (None, None) => return None,
    };
    Some(scope.id.to_string())
}

/// Run `fut` with `id` as the current trace id.
///
/// The previous id is visible again once the future completes or is
/// dropped; its output (including any error) is returned unchanged.
pub async fn with_trace_id<F>(id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    TASK_SCOPE.scope(TraceScope::new(id), fut).await
}

/// Like [`with_trace_id`] with a freshly generated id.
pub async fn with_new_trace_id<F>(fut: F) -> F::Output
where
    F: Future,
{
    with_trace_id(generate_trace_id(), fut).await
}

/// Synchronous form of [`with_trace_id`]. The scope is popped even if `f`
/// panics.
pub fn with_trace_id_sync<R>(id: impl Into<String>, f: impl FnOnce() -> R) -> R {
    let _guard = SyncScopeGuard::push(TraceScope::new(id));
    f()
}

pub fn with_new_trace_id_sync<R>(f: impl FnOnce() -> R) -> R {
    with_trace_id_sync(generate_trace_id(), f)
}

struct SyncScopeGuard;

impl SyncScopeGuard {
    fn push(scope: TraceScope) -> Self {
        SYNC_SCOPES.with(|stack| stack.borrow_mut().push(scope));
        SyncScopeGuard
    }
}

impl Drop for SyncScopeGuard {
    fn drop(&mut self) {
        SYNC_SCOPES.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn absent_outside_any_scope() {
        assert_eq!(current_trace_id(), None);
    }

    #[test]
    fn sync_scopes_nest_and_restore() {
        with_trace_id_sync("T", || {
            with_trace_id_sync("U", || {
                assert_eq!(current_trace_id().as_deref(), Some("U"));
            });
            assert_eq!(current_trace_id().as_deref(), Some("T"));
        });
        assert_eq!(current_trace_id(), None);
    }

    #[test]
    fn sync_scope_restores_after_panic() {
        let result = panic::catch_unwind(|| {
            with_trace_id_sync("boom", || panic!("body failed"));
        });
        assert!(result.is_err());
        assert_eq!(current_trace_id(), None);
    }

    #[test]
    fn sync_scope_propagates_error_result() {
        let out: Result<(), &str> = with_trace_id_sync("T", || Err("failed"));
        assert_eq!(out, Err("failed"));
        assert_eq!(current_trace_id(), None);
    }

    #[tokio::test]
    async fn async_scopes_nest_and_restore() {
        with_trace_id("T", async {
            with_trace_id("U", async {
                assert_eq!(current_trace_id().as_deref(), Some("U"));
            })
            .await;
            assert_eq!(current_trace_id().as_deref(), Some("T"));
        })
        .await;
        assert_eq!(current_trace_id(), None);
    }

    #[tokio::test]
    async fn sync_scope_inside_async_scope_shadows_it() {
        with_trace_id("outer", async {
            with_trace_id_sync("inner", || {
                assert_eq!(current_trace_id().as_deref(), Some("inner"));
            });
            assert_eq!(current_trace_id().as_deref(), Some("outer"));
        })
        .await;
    }

    #[tokio::test]
    async fn scopes_do_not_leak_across_tasks() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let scoped = tokio::spawn(with_trace_id("task-a", async move {
            let _ = rx.await;
            current_trace_id()
        }));
        let other = tokio::spawn(async { current_trace_id() });

        assert_eq!(other.await.unwrap(), None);
        tx.send(()).unwrap();
        assert_eq!(scoped.await.unwrap().as_deref(), Some("task-a"));
    }

    #[tokio::test]
    async fn new_trace_ids_are_unique() {
        let a = with_new_trace_id(async { current_trace_id() }).await.unwrap();
        let b = with_new_trace_id(async { current_trace_id() }).await.unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
