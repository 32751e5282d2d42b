//! Publishes summation results into observable cells.

use futures::FutureExt;
use std::sync::Arc;
use tally_core::context::{run_on, ContextProvider, TaskContext, TaskScope};
use tally_core::reactive::ObservableCell;
use tally_engine::SumEngine;

/// Invokes the engine and exposes the outcome through two cells.
///
/// Both fetch operations return before any computation has started: the
/// work is launched onto an execution context and proceeds only as that
/// context is driven. The two operations differ in how the result becomes
/// visible:
///
/// - the **direct** cell is written with an immediate store after hopping
///   back to the main context, so main-context observers see it as soon as
///   that hop runs;
/// - the **posted** cell is written through the posted-update queue, so
///   the value appears only once the main queue drains to it — and never
///   appears at all if nothing drains the queue, even though the
///   computation itself finished.
pub struct SumPublisher {
    engine: Arc<SumEngine>,
    contexts: Arc<dyn ContextProvider>,
    scope: TaskScope,
    direct: ObservableCell<u64>,
    posted: ObservableCell<u64>,
}

impl SumPublisher {
    /// Create a publisher launching onto `contexts.main()`, with the
    /// posted cell bound to the same context.
    pub fn new(engine: Arc<SumEngine>, contexts: Arc<dyn ContextProvider>) -> Self {
        let scope = TaskScope::new(contexts.main());
        let posted = ObservableCell::bound(contexts.main());
        Self {
            engine,
            contexts,
            scope,
            direct: ObservableCell::new(),
            posted,
        }
    }

    /// Handle onto the directly written cell.
    pub fn direct_sum(&self) -> ObservableCell<u64> {
        self.direct.clone()
    }

    /// Handle onto the posted cell.
    pub fn posted_sum(&self) -> ObservableCell<u64> {
        self.posted.clone()
    }

    /// Compute `sum(0..n)` on the `io` context and store it directly into
    /// the direct cell from the main context.
    ///
    /// Fire-and-forget: failures (a context torn down mid-flight) are
    /// logged, not surfaced.
    pub fn fetch_direct(&self, n: u32) {
        let engine = Arc::clone(&self.engine);
        let worker = self.contexts.io();
        let main = self.contexts.main();
        let cell = self.direct.clone();
        self.scope.spawn(async move {
            let result = match engine.sum_up_to_on(n, worker).await {
                Ok(sum) => sum,
                Err(error) => {
                    tracing::warn!(%error, "direct fetch lost its worker context");
                    return;
                }
            };
            let stored = run_on(&main, async move { cell.set(result) }).await;
            if let Err(error) = stored {
                tracing::warn!(%error, "direct fetch lost the main context");
            }
        });
    }

    /// Compute `sum(0..n)` on the caller-chosen context and post the
    /// result into the posted cell.
    ///
    /// The computation is pinned to the same context the operation is
    /// launched on. The posted write only becomes observable when the
    /// main queue is drained past it.
    pub fn fetch_posted(&self, n: u32, ctx: Arc<dyn TaskContext>) {
        let engine = Arc::clone(&self.engine);
        let cell = self.posted.clone();
        let compute_ctx = Arc::clone(&ctx);
        ctx.spawn(
            async move {
                match engine.sum_up_to_on(n, compute_ctx).await {
                    Ok(sum) => {
                        if let Err(error) = cell.post(sum) {
                            tracing::warn!(%error, "posted fetch could not queue its result");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "posted fetch lost its context");
                    }
                }
            }
            .boxed(),
        );
    }
}
