//! The summation engine and its three completion mechanisms.

// Allow expect on Mutex access - lock poisoning from panics is
// unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally_core::clock::{ClockEffects, TimerHandle};
use tally_core::context::{run_on, ContextProvider, Deferred, TaskContext, TaskScope};
use tally_core::errors::TallyError;

/// Fixed suspension inserted before each summation step.
pub const QUANTUM: Duration = Duration::from_millis(100);

/// The outstanding delayed-callback registration pair.
struct PendingPair {
    compute: TimerHandle,
    deliver: TimerHandle,
}

/// Computes `sum(0..n)` with a quantum of cooperative suspension per step.
///
/// The engine owns a launch scope pinned to the provider's `main` context
/// (used by [`sum_up_to_deferred`](Self::sum_up_to_deferred)) and holds at
/// most one outstanding delayed-callback pair at a time.
pub struct SumEngine {
    clock: Arc<dyn ClockEffects>,
    scope: TaskScope,
    pending: Mutex<Option<PendingPair>>,
}

/// The shared summation loop: one sleep per step, then accumulate.
///
/// Each sleep is only registered with the clock after the previous one
/// fired, so a virtual scheduler sees the delays one at a time.
async fn paced_sum(clock: &dyn ClockEffects, n: u32) -> u64 {
    let mut sum = 0u64;
    for i in 0..n {
        clock.sleep(QUANTUM).await;
        sum += u64::from(i);
    }
    sum
}

impl SumEngine {
    /// Create an engine on the given clock, launching deferred work onto
    /// `contexts.main()`.
    pub fn new(clock: Arc<dyn ClockEffects>, contexts: &dyn ContextProvider) -> Self {
        Self {
            clock,
            scope: TaskScope::new(contexts.main()),
            pending: Mutex::new(None),
        }
    }

    /// Sum the integers below `n`, suspending for one quantum before each
    /// step, on whatever context the caller is running on.
    ///
    /// `n = 0` returns 0 without ever touching the clock. With a real
    /// clock the call takes at least `n ×` [`QUANTUM`]; with a virtual
    /// clock it completes as fast as the clock is advanced, with the same
    /// result.
    pub async fn sum_up_to(&self, n: u32) -> u64 {
        paced_sum(self.clock.as_ref(), n).await
    }

    /// Same computation, pinned to `ctx`.
    ///
    /// The summation and its suspensions all run on the target context;
    /// the calling task suspends until the result hops back. Pinning the
    /// work to a serialized context whose driving thread is blocked on
    /// this very call deadlocks — the choice of context is the caller's
    /// contract.
    pub async fn sum_up_to_on(
        &self,
        n: u32,
        ctx: Arc<dyn TaskContext>,
    ) -> Result<u64, TallyError> {
        let clock = Arc::clone(&self.clock);
        run_on(&ctx, async move { paced_sum(clock.as_ref(), n).await }).await
    }

    /// Launch the summation on the engine's own scope and return a handle
    /// for the eventual result.
    ///
    /// The handle only resolves once the scope's context runs the work; if
    /// that context is never driven, awaiting the handle never returns.
    /// There is no cancellation — callers bound the await externally.
    pub fn sum_up_to_deferred(&self, n: u32) -> Deferred<u64> {
        let clock = Arc::clone(&self.clock);
        self.scope
            .spawn_deferred(async move { paced_sum(clock.as_ref(), n).await })
    }

    /// Legacy completion path: register two delayed jobs at the same fire
    /// time, one computing the sum into a shared slot and one delivering
    /// whatever the slot holds to `callback`.
    ///
    /// Schedulers that drain everything due at an instant run the pair in
    /// registration order and the callback observes the correct sum.
    /// Schedulers that fire one registration at a time can deliver the
    /// slot's default (0) with no error signal — the delivery job does not
    /// know whether the compute job ran. Nothing here reports or repairs
    /// that outcome.
    ///
    /// Re-invoking this method cancels the engine's previously registered
    /// pair, so at most one pair is ever outstanding. Handles that already
    /// fired cancel as no-ops.
    pub fn sum_up_to_with_callback<F>(&self, n: u32, callback: F, callback_delay: Duration)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(0u64));

        let mut pending = self.pending.lock().expect("pending pair lock poisoned");
        if let Some(prior) = pending.take() {
            tracing::debug!(
                compute = %prior.compute,
                deliver = %prior.deliver,
                "superseding outstanding callback pair"
            );
            let _ = self.clock.cancel_timer(prior.compute);
            let _ = self.clock.cancel_timer(prior.deliver);
        }

        let compute = self.clock.schedule(callback_delay, {
            let slot = Arc::clone(&slot);
            Box::new(move || {
                let mut sum = 0u64;
                for i in 0..n {
                    sum += u64::from(i);
                }
                *slot.lock().expect("result slot lock poisoned") = sum;
            })
        });
        let deliver = self.clock.schedule(
            callback_delay,
            Box::new(move || {
                let value = *slot.lock().expect("result slot lock poisoned");
                callback(value);
            }),
        );
        *pending = Some(PendingPair { compute, deliver });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use proptest::prelude::*;
    use tally_testkit::{TestContextProvider, VirtualScheduler};

    fn engine_on(sched: &VirtualScheduler) -> SumEngine {
        let provider = TestContextProvider::singleton(sched);
        SumEngine::new(Arc::new(sched.clone()), &provider)
    }

    #[test]
    fn zero_steps_complete_without_any_timer() {
        let sched = VirtualScheduler::new();
        let engine = engine_on(&sched);

        let deferred = engine.sum_up_to_deferred(0);
        // Only task polling, no time advancement.
        sched.run_until_stalled();

        assert_eq!(deferred.now_or_never().unwrap().unwrap(), 0);
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn each_step_waits_one_quantum() {
        let sched = VirtualScheduler::new();
        let engine = engine_on(&sched);

        let deferred = engine.sum_up_to_deferred(3);
        sched.advance_until_idle();

        assert_eq!(deferred.now_or_never().unwrap().unwrap(), 3);
        assert_eq!(sched.now_ms(), 3 * QUANTUM.as_millis() as u64);
    }

    proptest! {
        #[test]
        fn sum_matches_the_closed_form(n in 0u32..300) {
            let sched = VirtualScheduler::new();
            let engine = engine_on(&sched);

            let deferred = engine.sum_up_to_deferred(n);
            sched.advance_until_idle();

            let expected = u64::from(n) * u64::from(n.saturating_sub(1)) / 2;
            prop_assert_eq!(deferred.now_or_never().unwrap().unwrap(), expected);
        }
    }
}
