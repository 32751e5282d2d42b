//! Headless application-state layer for Tally.
//!
//! [`SumPublisher`](publisher::SumPublisher) invokes the summation engine
//! and republishes results through two observable cells with different
//! update disciplines — one written directly on the main context, one
//! written through the posted-update queue. UI layers (or tests) observe
//! the cells; nothing here renders anything.

pub mod publisher;

pub use publisher::SumPublisher;
