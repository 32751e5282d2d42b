//! Production effect handlers for Tally.
//!
//! Binds the seams declared in `tally-core` to real infrastructure:
//!
//! - [`clock::RuntimeClock`]: real timers (tokio sleep, spawned delayed
//!   jobs with abort-based cancellation).
//! - [`context::RuntimeContextProvider`]: a dedicated serialized looper
//!   thread for `main`, a bounded worker pool for `default`/`io`, and an
//!   inline executor for `unconfined`.
//!
//! Test environments substitute `tally-testkit` implementations behind the
//! same traits instead of using anything in this crate.

pub mod clock;
pub mod context;

pub use clock::RuntimeClock;
pub use context::RuntimeContextProvider;
