//! End-to-end smoke over the production handlers: real looper thread, real
//! worker pool, real timers. Small `n` keeps the quantum-paced delays short.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_app::SumPublisher;
use tally_core::reactive::ObservableCell;
use tally_core::ContextProvider;
use tally_effects::{RuntimeClock, RuntimeContextProvider};
use tally_engine::SumEngine;

/// Poll the cell until it holds a value or the bound expires.
fn await_value(cell: &ObservableCell<u64>, bound: Duration) -> Option<u64> {
    let deadline = Instant::now() + bound;
    while Instant::now() < deadline {
        if let Some(value) = cell.get() {
            return Some(value);
        }
        std::thread::yield_now();
    }
    None
}

#[test]
fn direct_fetch_lands_through_the_real_main_looper() {
    let provider: Arc<dyn ContextProvider> = Arc::new(RuntimeContextProvider::new().unwrap());
    let engine = Arc::new(SumEngine::new(
        Arc::new(RuntimeClock::new()),
        provider.as_ref(),
    ));
    let publisher = SumPublisher::new(engine, Arc::clone(&provider));

    let cell = publisher.direct_sum();
    publisher.fetch_direct(3);
    // Asynchronous launch: nothing is visible yet.
    assert_eq!(cell.get(), None);

    assert_eq!(await_value(&cell, Duration::from_secs(10)), Some(3));
}

#[test]
fn posted_fetch_lands_once_the_looper_processes_the_queued_write() {
    let provider: Arc<dyn ContextProvider> = Arc::new(RuntimeContextProvider::new().unwrap());
    let engine = Arc::new(SumEngine::new(
        Arc::new(RuntimeClock::new()),
        provider.as_ref(),
    ));
    let publisher = SumPublisher::new(engine, Arc::clone(&provider));

    publisher.fetch_posted(4, provider.io());
    // In production the looper drains continuously, so the posted write
    // becomes visible without any explicit drive step.
    assert_eq!(
        await_value(&publisher.posted_sum(), Duration::from_secs(10)),
        Some(6)
    );
}
