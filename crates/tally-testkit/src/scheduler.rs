//! A manually driven executor with a virtual clock.
//!
//! `VirtualScheduler` queues spawned tasks and registered timers without
//! running anything on its own. Tests drive it explicitly:
//!
//! - [`run_until_stalled`](VirtualScheduler::run_until_stalled) polls
//!   queued tasks to quiescence without moving time.
//! - [`drain`](VirtualScheduler::drain) jumps to the earliest pending
//!   deadline and fires either everything due at that instant or exactly
//!   one registration, per [`DrainPolicy`].
//! - [`advance_by`](VirtualScheduler::advance_by) /
//!   [`advance_until_idle`](VirtualScheduler::advance_until_idle) move
//!   virtual time stepwise, quiescing between deadlines so that delay
//!   chains (where each delay is only registered after the previous one
//!   fired) unfold exactly as they would in real time.

// Allow expect on Mutex access - lock poisoning from panics is
// unrecoverable, so expect() is the appropriate handling pattern.
#![allow(clippy::expect_used)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tally_core::clock::{ClockEffects, ClockError, TimerHandle, TimerJob};
use tally_core::context::TaskContext;
use uuid::Uuid;

/// How [`VirtualScheduler::drain`] treats several registrations due at the
/// same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Fire every registration due at the instant, in registration order.
    AllDue,
    /// Fire exactly one registration (the earliest-registered one due).
    OneAtATime,
}

/// Heap key ordering timers by deadline, then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
    deadline_ms: u64,
    seq: u64,
    id: TimerHandle,
}

/// What firing a timer does.
enum TimerRecord {
    /// Wake a suspended `sleep`.
    Sleep(Arc<SleepEntry>),
    /// Run a scheduled one-shot job.
    Job(TimerJob),
}

struct SleepState {
    fired: bool,
    waker: Option<Waker>,
}

struct SleepEntry {
    state: Mutex<SleepState>,
}

struct SleepFuture {
    entry: Arc<SleepEntry>,
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.entry.state.lock().expect("sleep entry lock poisoned");
        if state.fired {
            Poll::Ready(())
        } else {
            state.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// A spawned task: its future plus a re-enqueue waker.
struct QueuedTask {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    scheduler: Weak<SchedulerInner>,
    queued: AtomicBool,
}

impl ArcWake for QueuedTask {
    fn wake_by_ref(this: &Arc<Self>) {
        if this.queued.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = this.scheduler.upgrade() {
            inner
                .state
                .lock()
                .expect("scheduler state lock poisoned")
                .run_queue
                .push_back(Arc::clone(this));
        }
    }
}

struct SchedulerState {
    now_ms: u64,
    seq: u64,
    run_queue: VecDeque<Arc<QueuedTask>>,
    timer_keys: BinaryHeap<Reverse<TimerKey>>,
    /// Live timers; cancellation removes the record and leaves a dead key.
    timers: HashMap<TimerHandle, TimerRecord>,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
}

/// A serialized executor plus virtual clock, driven entirely by the test.
///
/// Cloning yields another handle onto the same scheduler. The scheduler
/// implements both `TaskContext` (spawned work queues until driven) and
/// `ClockEffects` (sleeps and scheduled jobs fire only when virtual time
/// is advanced past their deadline).
#[derive(Clone)]
pub struct VirtualScheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualScheduler {
    /// Create a scheduler at virtual time zero with nothing queued.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    now_ms: 0,
                    seq: 0,
                    run_queue: VecDeque::new(),
                    timer_keys: BinaryHeap::new(),
                    timers: HashMap::new(),
                }),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .expect("scheduler state lock poisoned")
    }

    /// Earliest deadline with a live record, discarding dead keys.
    fn next_live_deadline(state: &mut SchedulerState) -> Option<u64> {
        loop {
            let key = match state.timer_keys.peek() {
                Some(Reverse(key)) => *key,
                None => return None,
            };
            if state.timers.contains_key(&key.id) {
                return Some(key.deadline_ms);
            }
            state.timer_keys.pop();
        }
    }

    /// Remove and return records due exactly at `deadline`, per policy.
    fn take_due(
        state: &mut SchedulerState,
        deadline: u64,
        policy: DrainPolicy,
    ) -> Vec<TimerRecord> {
        let mut records = Vec::new();
        loop {
            let key = match state.timer_keys.peek() {
                Some(Reverse(key)) if key.deadline_ms == deadline => *key,
                _ => break,
            };
            state.timer_keys.pop();
            if let Some(record) = state.timers.remove(&key.id) {
                records.push(record);
                if policy == DrainPolicy::OneAtATime {
                    break;
                }
            }
        }
        records
    }

    fn fire(record: TimerRecord) {
        match record {
            TimerRecord::Sleep(entry) => {
                let waker = {
                    let mut state = entry.state.lock().expect("sleep entry lock poisoned");
                    state.fired = true;
                    state.waker.take()
                };
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
            TimerRecord::Job(job) => job(),
        }
    }

    /// Poll queued tasks until none are runnable. Virtual time does not
    /// move; tasks suspended on a sleep stay suspended.
    pub fn run_until_stalled(&self) {
        loop {
            let task = self.lock().run_queue.pop_front();
            let Some(task) = task else { break };
            task.queued.store(false, Ordering::Release);
            let Some(mut fut) = task.future.lock().expect("task lock poisoned").take() else {
                continue;
            };
            let waker = waker_ref(&task);
            let mut cx = Context::from_waker(&waker);
            if fut.as_mut().poll(&mut cx).is_pending() {
                *task.future.lock().expect("task lock poisoned") = Some(fut);
            }
        }
    }

    /// Jump virtual time to the earliest pending deadline and fire what is
    /// due there according to `policy`, then run tasks to quiescence.
    ///
    /// With no pending timers this just quiesces the task queue.
    pub fn drain(&self, policy: DrainPolicy) {
        self.run_until_stalled();
        let records = {
            let mut state = self.lock();
            match Self::next_live_deadline(&mut state) {
                Some(deadline) => {
                    state.now_ms = state.now_ms.max(deadline);
                    tracing::trace!(deadline, ?policy, "draining due timers");
                    Self::take_due(&mut state, deadline, policy)
                }
                None => Vec::new(),
            }
        };
        for record in records {
            Self::fire(record);
        }
        self.run_until_stalled();
    }

    /// Advance virtual time by `duration`, firing every deadline inside the
    /// window in order and quiescing tasks between deadlines.
    ///
    /// Work that schedules further delays while running (delay chains) is
    /// picked up as long as the follow-up deadlines still fall inside the
    /// window.
    pub fn advance_by(&self, duration: Duration) {
        let target = self.lock().now_ms + duration.as_millis() as u64;
        loop {
            self.run_until_stalled();
            let due = {
                let mut state = self.lock();
                match Self::next_live_deadline(&mut state) {
                    Some(deadline) if deadline <= target => {
                        state.now_ms = state.now_ms.max(deadline);
                        Some(Self::take_due(&mut state, deadline, DrainPolicy::AllDue))
                    }
                    _ => None,
                }
            };
            match due {
                Some(records) => {
                    for record in records {
                        Self::fire(record);
                    }
                }
                None => break,
            }
        }
        {
            let mut state = self.lock();
            state.now_ms = state.now_ms.max(target);
        }
        self.run_until_stalled();
    }

    /// Keep jumping to the next deadline until no tasks and no timers
    /// remain runnable.
    pub fn advance_until_idle(&self) {
        loop {
            self.run_until_stalled();
            let due = {
                let mut state = self.lock();
                match Self::next_live_deadline(&mut state) {
                    Some(deadline) => {
                        state.now_ms = state.now_ms.max(deadline);
                        Some(Self::take_due(&mut state, deadline, DrainPolicy::AllDue))
                    }
                    None => None,
                }
            };
            match due {
                Some(records) => {
                    for record in records {
                        Self::fire(record);
                    }
                }
                None => break,
            }
        }
    }

    /// Number of tasks currently queued to run.
    pub fn pending_tasks(&self) -> usize {
        self.lock().run_queue.len()
    }

    /// Number of live timer registrations (sleeps and jobs).
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }
}

impl TaskContext for VirtualScheduler {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        let task = Arc::new(QueuedTask {
            future: Mutex::new(Some(fut)),
            scheduler: Arc::downgrade(&self.inner),
            queued: AtomicBool::new(true),
        });
        self.lock().run_queue.push_back(task);
    }

    fn label(&self) -> &str {
        "virtual"
    }
}

#[async_trait]
impl ClockEffects for VirtualScheduler {
    async fn sleep(&self, duration: Duration) {
        let entry = Arc::new(SleepEntry {
            state: Mutex::new(SleepState {
                fired: false,
                waker: None,
            }),
        });
        {
            let mut state = self.lock();
            let deadline_ms = state.now_ms + duration.as_millis() as u64;
            let seq = state.seq;
            state.seq += 1;
            let id = Uuid::new_v4();
            state.timer_keys.push(Reverse(TimerKey {
                deadline_ms,
                seq,
                id,
            }));
            state.timers.insert(id, TimerRecord::Sleep(Arc::clone(&entry)));
        }
        SleepFuture { entry }.await;
    }

    fn schedule(&self, delay: Duration, job: TimerJob) -> TimerHandle {
        let mut state = self.lock();
        let deadline_ms = state.now_ms + delay.as_millis() as u64;
        let seq = state.seq;
        state.seq += 1;
        let id = Uuid::new_v4();
        state.timer_keys.push(Reverse(TimerKey {
            deadline_ms,
            seq,
            id,
        }));
        state.timers.insert(id, TimerRecord::Job(job));
        id
    }

    fn cancel_timer(&self, handle: TimerHandle) -> Result<(), ClockError> {
        let mut state = self.lock();
        match state.timers.remove(&handle) {
            Some(_) => Ok(()),
            None => Err(ClockError::TimerNotFound { handle }),
        }
    }

    fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn spawned_work_stays_queued_until_driven() {
        let sched = VirtualScheduler::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        sched.spawn(async move { flag.store(true, Ordering::SeqCst) }.boxed());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(sched.pending_tasks(), 1);

        sched.run_until_stalled();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(sched.pending_tasks(), 0);
    }

    #[test]
    fn delay_chains_register_one_timer_at_a_time() {
        let sched = VirtualScheduler::new();
        let clock = Arc::new(sched.clone());

        sched.spawn(
            {
                let clock = Arc::clone(&clock);
                async move {
                    for _ in 0..3 {
                        clock.sleep(Duration::from_millis(10)).await;
                    }
                }
            }
            .boxed(),
        );

        sched.run_until_stalled();
        // Only the first step's delay exists; the rest are unscheduled.
        assert_eq!(sched.pending_timers(), 1);

        sched.advance_by(Duration::from_millis(10));
        assert_eq!(sched.pending_timers(), 1);

        sched.advance_by(Duration::from_millis(20));
        assert_eq!(sched.pending_timers(), 0);
        assert_eq!(sched.now_ms(), 30);
    }

    #[test]
    fn all_due_fires_same_instant_jobs_in_registration_order() {
        let sched = VirtualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            sched.schedule(
                Duration::from_millis(5),
                Box::new(move || order.lock().unwrap().push(tag)),
            );
        }

        sched.drain(DrainPolicy::AllDue);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn one_at_a_time_leaves_later_same_instant_jobs_pending() {
        let sched = VirtualScheduler::new();
        let fired = Arc::new(AtomicU64::new(0));

        for _ in 0..2 {
            let fired = Arc::clone(&fired);
            sched.schedule(
                Duration::from_millis(5),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        sched.drain(DrainPolicy::OneAtATime);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(sched.pending_timers(), 1);

        sched.drain(DrainPolicy::OneAtATime);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn cancelled_timers_never_fire_and_cannot_cancel_twice() {
        let sched = VirtualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let handle = sched.schedule(
            Duration::from_millis(5),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        sched.cancel_timer(handle).unwrap();
        assert!(matches!(
            sched.cancel_timer(handle),
            Err(ClockError::TimerNotFound { .. })
        ));

        sched.advance_until_idle();
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn advance_by_stops_short_of_later_deadlines() {
        let sched = VirtualScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        sched.schedule(
            Duration::from_millis(50),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        sched.advance_by(Duration::from_millis(49));
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(sched.now_ms(), 49);

        sched.advance_by(Duration::from_millis(1));
        assert!(fired.load(Ordering::SeqCst));
    }
}
