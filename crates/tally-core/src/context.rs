//! Execution contexts and structured launch helpers.
//!
//! A [`TaskContext`] is a named scheduling domain that suspendable work can
//! be pinned to. A [`ContextProvider`] exposes the four contexts the rest
//! of the workspace is written against (`main`, `default`, `io`,
//! `unconfined`); production and test environments bind the names to
//! different concrete schedulers, and every component receives its provider
//! through its constructor.
//!
//! [`run_on`] is the cross-context hop: run a future on another context and
//! await its result in place. [`TaskScope`] is an owned launch scope pinned
//! to one context, and [`Deferred`] is the handle for a result produced on
//! such a scope.

use crate::errors::TallyError;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A named scheduling domain for suspendable work.
///
/// Implementations decide where and when spawned futures run: a serialized
/// queue, a worker pool, or inline on the calling thread. Spawning never
/// blocks the caller.
pub trait TaskContext: Send + Sync {
    /// Submit a future to this context. Fire-and-forget.
    fn spawn(&self, fut: BoxFuture<'static, ()>);

    /// Short name of the context, for diagnostics.
    fn label(&self) -> &str;
}

/// Provider of the four named execution contexts.
///
/// Components hold an `Arc<dyn ContextProvider>` injected at construction;
/// nothing consults a process-wide default.
pub trait ContextProvider: Send + Sync {
    /// The single serialized UI-affinity queue. Work submitted here starts
    /// in submission order and interleaves only at suspension points.
    fn main(&self) -> Arc<dyn TaskContext>;

    /// CPU-bound background work.
    fn default(&self) -> Arc<dyn TaskContext>;

    /// Blocking-prone background work.
    fn io(&self) -> Arc<dyn TaskContext>;

    /// Starts executing immediately on the calling thread; after the first
    /// suspension, resumes wherever the wakeup happens.
    fn unconfined(&self) -> Arc<dyn TaskContext>;
}

/// Run `fut` on `ctx` and await its result in place.
///
/// The future is spawned onto the target context and its output is carried
/// back over a oneshot channel. Returns [`TallyError::ContextLost`] if the
/// target context drops the task without completing it.
///
/// If `ctx` is a serialized queue whose driving thread is currently blocked
/// waiting on this very call, the hop can never be processed and the await
/// never returns. That deadlock is a property of the caller's context
/// choice, not something this function detects.
pub async fn run_on<T, F>(ctx: &Arc<dyn TaskContext>, fut: F) -> Result<T, TallyError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    ctx.spawn(
        async move {
            let value = fut.await;
            let _ = tx.send(value);
        }
        .boxed(),
    );
    rx.await
        .map_err(|_| TallyError::context_lost("target context dropped the task"))
}

/// An owned launch scope pinned to one execution context.
pub struct TaskScope {
    context: Arc<dyn TaskContext>,
}

impl TaskScope {
    /// Create a scope whose launches all land on `context`.
    pub fn new(context: Arc<dyn TaskContext>) -> Self {
        Self { context }
    }

    /// The context this scope launches onto.
    pub fn context(&self) -> &Arc<dyn TaskContext> {
        &self.context
    }

    /// Launch a future on the scope's context. Fire-and-forget.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.context.spawn(fut.boxed());
    }

    /// Launch a future on the scope's context, returning a handle for its
    /// eventual result.
    pub fn spawn_deferred<T, F>(&self, fut: F) -> Deferred<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.context.spawn(
            async move {
                let _ = tx.send(fut.await);
            }
            .boxed(),
        );
        Deferred { receiver: rx }
    }
}

/// Handle to an in-flight computation launched with
/// [`TaskScope::spawn_deferred`].
///
/// Awaiting the handle suspends until the computation completes. If the
/// backing context is never driven, the await never returns — there is no
/// cancellation API, so callers that cannot rule this out must bound the
/// await with an external timeout. The handle resolves to
/// [`TallyError::ContextLost`] only when the backing context has been torn
/// down with the computation still queued.
pub struct Deferred<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, TallyError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| TallyError::context_lost("deferred computation was dropped")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Runs every spawned future to completion on the spot. Only suitable
    /// for futures that never suspend.
    struct ImmediateContext;

    impl TaskContext for ImmediateContext {
        fn spawn(&self, fut: BoxFuture<'static, ()>) {
            futures::executor::block_on(fut);
        }

        fn label(&self) -> &str {
            "immediate"
        }
    }

    /// Holds spawned futures until the test drains them.
    #[derive(Default)]
    struct HoldingContext {
        held: Mutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl HoldingContext {
        fn drain(&self) {
            let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
            for fut in held {
                futures::executor::block_on(fut);
            }
        }

        fn discard(&self) {
            self.held.lock().unwrap().clear();
        }
    }

    impl TaskContext for HoldingContext {
        fn spawn(&self, fut: BoxFuture<'static, ()>) {
            self.held.lock().unwrap().push(fut);
        }

        fn label(&self) -> &str {
            "holding"
        }
    }

    #[test]
    fn run_on_returns_the_spawned_result() {
        let ctx: Arc<dyn TaskContext> = Arc::new(ImmediateContext);
        let result = futures::executor::block_on(run_on(&ctx, async { 7 }));
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn run_on_reports_a_dropped_task_as_context_lost() {
        let holding = Arc::new(HoldingContext::default());
        let ctx: Arc<dyn TaskContext> = holding.clone();
        let hop = run_on(&ctx, async { 7 });
        holding.discard();
        let result = futures::executor::block_on(hop);
        assert!(matches!(result, Err(TallyError::ContextLost { .. })));
    }

    #[test]
    fn deferred_resolves_after_the_context_runs() {
        let holding = Arc::new(HoldingContext::default());
        let scope = TaskScope::new(holding.clone());
        let deferred = scope.spawn_deferred(async { 41 + 1 });

        // Nothing has run yet; the handle must still be pending.
        let mut pending = Box::pin(deferred);
        assert!((&mut pending).now_or_never().is_none());

        holding.drain();
        let result = futures::executor::block_on(pending);
        assert_eq!(result.unwrap(), 42);
    }
}
