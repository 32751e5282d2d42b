//! Quantum-paced summation engine.
//!
//! [`SumEngine`](engine::SumEngine) computes the triangular sum of the
//! integers below `n` through three completion mechanisms with distinct
//! timing and cancellation semantics: a cooperative-suspension async call,
//! a deferred handle launched on an owned scope, and a legacy delayed
//! callback pair. The computation itself is trivial on purpose — the
//! interesting behavior is entirely in how each mechanism interacts with
//! the clock and contexts driving it.

pub mod engine;

pub use engine::{SumEngine, QUANTUM};
