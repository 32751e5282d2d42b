//! Core abstractions for the Tally workspace.
//!
//! This crate defines the seams everything else plugs into:
//!
//! - [`clock`]: the [`ClockEffects`](clock::ClockEffects) trait, covering
//!   cooperative suspension and cancellable delayed callbacks. Production
//!   code binds it to real timers; tests bind it to a manually advanced
//!   virtual scheduler.
//! - [`context`]: named execution contexts ([`TaskContext`](context::TaskContext),
//!   [`ContextProvider`](context::ContextProvider)), plus structured launch
//!   helpers ([`TaskScope`](context::TaskScope), [`run_on`](context::run_on),
//!   [`Deferred`](context::Deferred)).
//! - [`reactive`]: the poll-observable single-slot
//!   [`ObservableCell`](reactive::ObservableCell) with its two write
//!   disciplines (direct and posted).
//! - [`errors`]: the unified [`TallyError`](errors::TallyError).
//!
//! Nothing in this crate reaches for a global: clocks and context providers
//! are passed into constructors, so an entire component tree can be rebound
//! onto controllable test implementations.

pub mod clock;
pub mod context;
pub mod errors;
pub mod reactive;

pub use clock::{ClockEffects, ClockError, TimerHandle, TimerJob};
pub use context::{run_on, ContextProvider, Deferred, TaskContext, TaskScope};
pub use errors::TallyError;
pub use reactive::{ObservableCell, Subscription};
