//! Test utilities for deterministic scheduling and time control.
//!
//! The centerpiece is [`VirtualScheduler`]: a single object that is both a
//! manually driven serialized executor and a virtual clock, substitutable
//! anywhere production code expects a `TaskContext` or `ClockEffects`.
//! Nothing runs and no time passes until the test says so, which makes
//! ordering hazards reproducible instead of flaky.
//!
//! [`TestContextProvider`] binds the four context names onto virtual
//! schedulers, and [`assertions`] holds the bounded-await helpers used to
//! pin down behaviors whose failure mode is "never completes".

pub mod assertions;
pub mod provider;
pub mod scheduler;

pub use assertions::{assert_completes_within, assert_takes_at_least, init_test_logging};
pub use provider::TestContextProvider;
pub use scheduler::{DrainPolicy, VirtualScheduler};
