//! Timing semantics of the cooperative summation paths.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tally_core::clock::ClockEffects;
use tally_core::context::{ContextProvider, TaskScope};
use tally_core::errors::TallyError;
use tally_effects::RuntimeClock;
use tally_engine::{SumEngine, QUANTUM};
use tally_testkit::{assert_completes_within, assert_takes_at_least, TestContextProvider, VirtualScheduler};

fn virtual_engine(sched: &VirtualScheduler) -> SumEngine {
    let provider = TestContextProvider::singleton(sched);
    SumEngine::new(Arc::new(sched.clone()), &provider)
}

#[tokio::test(start_paused = true)]
async fn real_clock_pacing_takes_a_quantum_per_step() {
    let provider = TestContextProvider::singleton(&VirtualScheduler::new());
    let engine = SumEngine::new(Arc::new(RuntimeClock::new()), &provider);

    let result = assert_takes_at_least(3 * QUANTUM, engine.sum_up_to(3)).await;
    assert_eq!(result.unwrap(), 3);
}

#[test]
fn virtual_clock_skips_the_quanta_without_changing_the_result() {
    let sched = VirtualScheduler::new();
    let engine = virtual_engine(&sched);

    let deferred = engine.sum_up_to_deferred(100);

    let wall_start = std::time::Instant::now();
    sched.advance_until_idle();
    let wall_elapsed = wall_start.elapsed();

    assert_eq!(deferred.now_or_never().unwrap().unwrap(), 4950);
    // 100 virtual quanta passed...
    assert_eq!(sched.now_ms(), 100 * QUANTUM.as_millis() as u64);
    // ...in effectively no wall time.
    assert!(wall_elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn deferred_on_an_undriven_context_times_out_instead_of_resolving() {
    let sched = VirtualScheduler::new();
    let engine = virtual_engine(&sched);

    let deferred = engine.sum_up_to_deferred(5);
    // The scheduler is never driven, so the await can only end via the
    // external bound.
    let result = assert_completes_within(Duration::from_millis(100), deferred).await;
    assert!(matches!(result, Err(TallyError::Timeout { .. })));
}

#[tokio::test]
async fn deferred_resolves_once_its_context_is_driven() {
    let sched = VirtualScheduler::new();
    let engine = virtual_engine(&sched);

    let deferred = engine.sum_up_to_deferred(5);
    sched.advance_until_idle();

    let result = assert_completes_within(Duration::from_millis(100), deferred).await;
    assert_eq!(result.unwrap().unwrap(), 10);
}

#[test]
fn pinned_variant_runs_the_suspensions_on_the_target_context() {
    let sched = VirtualScheduler::new();
    let provider = TestContextProvider::singleton(&sched);
    let engine = Arc::new(virtual_engine(&sched));

    let worker = provider.io();
    let scope = TaskScope::new(provider.main());
    let deferred = scope.spawn_deferred({
        let engine = Arc::clone(&engine);
        async move { engine.sum_up_to_on(4, worker).await }
    });

    sched.advance_until_idle();
    assert_eq!(deferred.now_or_never().unwrap().unwrap().unwrap(), 6);
    assert_eq!(sched.now_ms(), 4 * QUANTUM.as_millis() as u64);
}
