//! loadmix core: invocable tests, weighted traffic mixing, statistics.
//!
//! This crate contains the pieces a load-generating thread is built from:
//! - Invocable/Outcome capability traits for simulated units of work
//! - Uniform random sources, including a replayable scripted source
//! - The weighted invoker: per-iteration random choice between two tests
//! - Per-test statistics that double as an invocation observer
//! - Deterministic seed hierarchy for reproducible per-thread traffic
//! - An HTTP GET test

pub mod context;
pub mod http;
pub mod invocable;
pub mod invoker;
pub mod random;
pub mod rng;
pub mod stats;

pub use context::ThreadContext;
pub use http::{HttpOutcome, HttpTest};
pub use invocable::{describe, Invocable, InvocationError, Outcome, TestId};
pub use invoker::{
    select, Discard, InvocationObserver, InvocationRecord, InvokerError, LoopSummary,
    WeightedInvoker,
};
pub use random::{RandomSource, ScriptedSource, SourceError};
pub use rng::SeedHierarchy;
pub use stats::{StatisticsSet, TestStatistics};
