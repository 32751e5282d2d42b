//! Context provider backed by virtual schedulers.

use crate::scheduler::VirtualScheduler;
use std::sync::Arc;
use tally_core::context::{ContextProvider, TaskContext};

/// Binds the four context names onto manually driven schedulers.
///
/// [`singleton`](Self::singleton) is the common configuration: every name
/// resolves to one scheduler, so a single drive loop moves the whole
/// system. [`split`](Self::split) keeps `main` separate from the
/// background names, which is what cross-queue visibility tests need —
/// background work can be run to completion while the main queue sits
/// untouched.
pub struct TestContextProvider {
    main: Arc<VirtualScheduler>,
    background: Arc<VirtualScheduler>,
}

impl TestContextProvider {
    /// Bind all four names to `sched`.
    pub fn singleton(sched: &VirtualScheduler) -> Self {
        let shared = Arc::new(sched.clone());
        Self {
            main: Arc::clone(&shared),
            background: shared,
        }
    }

    /// Bind `main` to one scheduler and `default`/`io`/`unconfined` to
    /// another.
    pub fn split(main: &VirtualScheduler, background: &VirtualScheduler) -> Self {
        Self {
            main: Arc::new(main.clone()),
            background: Arc::new(background.clone()),
        }
    }
}

impl ContextProvider for TestContextProvider {
    fn main(&self) -> Arc<dyn TaskContext> {
        self.main.clone()
    }

    fn default(&self) -> Arc<dyn TaskContext> {
        self.background.clone()
    }

    fn io(&self) -> Arc<dyn TaskContext> {
        self.background.clone()
    }

    fn unconfined(&self) -> Arc<dyn TaskContext> {
        self.background.clone()
    }
}
