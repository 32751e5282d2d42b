//! Production execution contexts.
//!
//! Binds the four named contexts to concrete schedulers:
//!
//! - `main`: a dedicated looper thread driving a single-threaded runtime.
//!   Submitted work starts in submission order and interleaves only at
//!   suspension points — the serialized UI-affinity queue.
//! - `default` / `io`: handles onto one shared bounded worker pool sized
//!   `2 × available parallelism + 1`.
//! - `unconfined`: an inline executor that polls immediately on the calling
//!   thread and resumes on whichever thread wakes it.

// Allow expect on Mutex access - lock poisoning from panics is
// unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tally_core::context::{ContextProvider, TaskContext};
use tally_core::errors::TallyError;
use tokio::sync::mpsc;

/// Production provider binding the four context names to real schedulers.
///
/// Construction spawns the looper thread and the worker pool; both live
/// until the provider is dropped. Dropping the provider shuts the looper
/// down, and any work still queued there is dropped (surfacing as
/// `ContextLost` to anyone awaiting it).
pub struct RuntimeContextProvider {
    main: Arc<LooperContext>,
    default: Arc<WorkerContext>,
    io: Arc<WorkerContext>,
    unconfined: Arc<InlineContext>,
}

impl RuntimeContextProvider {
    /// Build the looper thread, worker pool, and inline executor.
    pub fn new() -> Result<Self, TallyError> {
        let pool = Arc::new(build_worker_pool()?);
        Ok(Self {
            main: Arc::new(LooperContext::start()?),
            default: Arc::new(WorkerContext {
                runtime: Arc::clone(&pool),
                label: "default",
            }),
            io: Arc::new(WorkerContext {
                runtime: pool,
                label: "io",
            }),
            unconfined: Arc::new(InlineContext),
        })
    }
}

impl ContextProvider for RuntimeContextProvider {
    fn main(&self) -> Arc<dyn TaskContext> {
        self.main.clone()
    }

    fn default(&self) -> Arc<dyn TaskContext> {
        self.default.clone()
    }

    fn io(&self) -> Arc<dyn TaskContext> {
        self.io.clone()
    }

    fn unconfined(&self) -> Arc<dyn TaskContext> {
        self.unconfined.clone()
    }
}

fn build_worker_pool() -> Result<tokio::runtime::Runtime, TallyError> {
    // 2 × processor count + 1, the classic mobile background-pool heuristic.
    let parallelism = std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1);
    let workers = parallelism * 2 + 1;
    tracing::debug!(workers, "starting background worker pool");
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("tally-worker")
        .enable_time()
        .build()
        .map_err(|error| TallyError::internal(format!("building worker pool: {error}")))
}

/// The serialized `main` queue: one thread, one task at a time between
/// suspension points.
struct LooperContext {
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

impl LooperContext {
    fn start() -> Result<Self, TallyError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|error| TallyError::internal(format!("building main looper runtime: {error}")))?;
        std::thread::Builder::new()
            .name("tally-main".to_owned())
            .spawn(move || {
                let local = tokio::task::LocalSet::new();
                local.block_on(&runtime, async move {
                    while let Some(task) = receiver.recv().await {
                        tokio::task::spawn_local(task);
                    }
                });
            })
            .map_err(|error| TallyError::internal(format!("spawning main looper thread: {error}")))?;
        Ok(Self { sender })
    }
}

impl TaskContext for LooperContext {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        if self.sender.send(fut).is_err() {
            tracing::warn!("main context has shut down; dropping task");
        }
    }

    fn label(&self) -> &str {
        "main"
    }
}

/// Handle onto the shared background worker pool.
struct WorkerContext {
    runtime: Arc<tokio::runtime::Runtime>,
    label: &'static str,
}

impl TaskContext for WorkerContext {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        self.runtime.spawn(fut);
    }

    fn label(&self) -> &str {
        self.label
    }
}

/// The `unconfined` executor.
///
/// Spawned futures are polled immediately on the calling thread; after the
/// first suspension they resume on whichever thread delivers the wakeup.
struct InlineContext;

impl TaskContext for InlineContext {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        let task = Arc::new(InlineTask {
            future: Mutex::new(Some(fut)),
            notified: AtomicBool::new(false),
        });
        InlineTask::run(&task);
    }

    fn label(&self) -> &str {
        "unconfined"
    }
}

struct InlineTask {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    notified: AtomicBool,
}

impl InlineTask {
    fn run(this: &Arc<Self>) {
        loop {
            // Take the future out so a concurrent or reentrant wake cannot
            // double-poll it; whoever holds it honors `notified` afterwards.
            let Some(mut fut) = this.future.lock().expect("inline task lock poisoned").take()
            else {
                return;
            };
            this.notified.store(false, Ordering::Release);
            let waker = waker_ref(this);
            let mut cx = Context::from_waker(&waker);
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(()) => return,
                Poll::Pending => {
                    *this.future.lock().expect("inline task lock poisoned") = Some(fut);
                    if !this.notified.swap(false, Ordering::AcqRel) {
                        return;
                    }
                }
            }
        }
    }
}

impl ArcWake for InlineTask {
    fn wake_by_ref(this: &Arc<Self>) {
        this.notified.store(true, Ordering::Release);
        Self::run(this);
    }
}
