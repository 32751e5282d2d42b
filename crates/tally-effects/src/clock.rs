//! Real time handler for production use.

// Allow expect on Mutex access - lock poisoning from panics is
// unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tally_core::clock::{ClockEffects, ClockError, TimerHandle, TimerJob};
use tokio::time;
use uuid::Uuid;

/// Clock backed by the tokio timer wheel.
///
/// `sleep` suspends on a real (or, under a paused test runtime,
/// auto-advanced) tokio timer. `schedule` spawns a task that sleeps out the
/// delay and then runs the job; cancellation aborts that task. Must be used
/// from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct RuntimeClock {
    origin: Instant,
    timers: Arc<Mutex<HashMap<TimerHandle, tokio::task::JoinHandle<()>>>>,
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeClock {
    /// Create a clock whose timeline starts at construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl ClockEffects for RuntimeClock {
    async fn sleep(&self, duration: Duration) {
        time::sleep(duration).await;
    }

    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerHandle {
        let handle = Uuid::new_v4();
        let timers = Arc::clone(&self.timers);
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            job();
            timers.lock().expect("timer registry lock poisoned").remove(&handle);
        });
        self.timers
            .lock()
            .expect("timer registry lock poisoned")
            .insert(handle, task);
        handle
    }

    fn cancel_timer(&self, handle: TimerHandle) -> Result<(), ClockError> {
        let mut timers = self.timers.lock().expect("timer registry lock poisoned");
        match timers.remove(&handle) {
            Some(task) => {
                task.abort();
                Ok(())
            }
            None => Err(ClockError::TimerNotFound { handle }),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
