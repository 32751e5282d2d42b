//! Clock and timer effect trait.
//!
//! All delayed execution in the workspace flows through [`ClockEffects`]:
//! cooperative suspension (`sleep`) and one-shot delayed callbacks
//! (`schedule`/`cancel_timer`). Production code binds the trait to real
//! timers (`tally-effects`); tests bind it to a virtual scheduler whose
//! time only moves when the test advances it (`tally-testkit`).
//!
//! A `sleep` is registered with the clock only at the moment it is awaited,
//! so a chain of sleeps inside a loop is scheduled one step at a time —
//! each delay exists only after the previous one fired.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Handle for a scheduled delayed callback.
pub type TimerHandle = Uuid;

/// A one-shot job run when its timer fires.
pub type TimerJob = Box<dyn FnOnce() + Send + 'static>;

/// Error type for timer operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClockError {
    /// The timer already fired or was never registered.
    #[error("timer not found: {handle}")]
    TimerNotFound {
        /// The handle that could not be resolved.
        handle: TimerHandle,
    },
}

/// Clock operations available to suspendable work.
#[async_trait]
pub trait ClockEffects: Send + Sync {
    /// Suspend the calling task for `duration` on this clock's timeline.
    async fn sleep(&self, duration: Duration);

    /// Register `job` to run once, `delay` after the clock's current time.
    ///
    /// Jobs registered for the same fire time run in registration order
    /// under schedulers that drain everything due at an instant; schedulers
    /// that fire one registration at a time make no such promise between
    /// independently registered jobs.
    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerHandle;

    /// Cancel a pending registration.
    ///
    /// Returns [`ClockError::TimerNotFound`] when the timer already fired
    /// or was never registered with this clock.
    fn cancel_timer(&self, handle: TimerHandle) -> Result<(), ClockError>;

    /// Milliseconds elapsed on this clock's own timeline.
    fn now_ms(&self) -> u64;
}

/// Blanket implementation for `Arc<T>` where `T: ClockEffects`.
#[async_trait]
impl<T: ClockEffects + ?Sized> ClockEffects for Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }

    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerHandle {
        (**self).schedule(delay, job)
    }

    fn cancel_timer(&self, handle: TimerHandle) -> Result<(), ClockError> {
        (**self).cancel_timer(handle)
    }

    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}
