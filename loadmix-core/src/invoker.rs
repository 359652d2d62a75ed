//! Weighted invoker: mixes traffic between two tests.
//!
//! Each iteration draws one sample `r` from a [`RandomSource`]. If
//! `r > threshold` the first test runs, otherwise the second. The comparison
//! is strict, so a sample exactly equal to the threshold picks the second
//! test. With `threshold = 0.8` roughly one call in five goes to `tests[0]`.
//!
//! The loop is synchronous and fixed-count. Invocation errors are not caught:
//! the first one ends the loop and is returned to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use crate::invocable::{Invocable, InvocationError, TestId};
use crate::random::RandomSource;

/// Errors from the weighted invoker.
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("weighted invoker needs at least 2 tests, got {found}")]
    TooFewTests { found: usize },
    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),
    #[error("iteration {iteration} aborted: {source}")]
    Invocation {
        iteration: usize,
        test: TestId,
        #[source]
        source: InvocationError,
    },
}

/// Pick the branch for one sample: `0` if `sample > threshold`, else `1`.
pub fn select(sample: f64, threshold: f64) -> usize {
    if sample > threshold {
        0
    } else {
        1
    }
}

/// One completed invocation, as seen by an observer.
#[derive(Debug)]
pub struct InvocationRecord<'a, O> {
    pub iteration: usize,
    pub selected: usize,
    pub test: TestId,
    pub elapsed: Duration,
    pub outcome: &'a O,
}

/// Receives the outcome of every invocation in a loop.
pub trait InvocationObserver<O> {
    fn observe(&mut self, record: &InvocationRecord<'_, O>);
}

impl<O, F> InvocationObserver<O> for F
where
    F: FnMut(&InvocationRecord<'_, O>),
{
    fn observe(&mut self, record: &InvocationRecord<'_, O>) {
        self(record)
    }
}

/// Observer that discards every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl<O> InvocationObserver<O> for Discard {
    fn observe(&mut self, _record: &InvocationRecord<'_, O>) {}
}

/// What a loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub invocations: usize,
    /// Invocations per branch: `[tests[0], tests[1]]`.
    pub selections: [usize; 2],
    pub cancelled: bool,
}

/// Fixed-count weighted selection loop over two tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedInvoker {
    iterations: usize,
    threshold: f64,
}

impl WeightedInvoker {
    pub fn new(iterations: usize, threshold: f64) -> Result<Self, InvokerError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(InvokerError::InvalidThreshold(threshold));
        }
        Ok(Self {
            iterations,
            threshold,
        })
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run the loop, discarding outcomes.
    pub fn run<T, R>(&self, tests: &[T], rng: &mut R) -> Result<LoopSummary, InvokerError>
    where
        T: Invocable,
        R: RandomSource + ?Sized,
    {
        self.run_with(tests, rng, &mut Discard, None)
    }

    /// Run the loop, handing each outcome to `observer`.
    ///
    /// `cancel` is checked before every iteration; once set, the loop stops
    /// and the summary is marked `cancelled`. An invocation in flight is never
    /// interrupted.
    pub fn run_with<T, R, Obs>(
        &self,
        tests: &[T],
        rng: &mut R,
        observer: &mut Obs,
        cancel: Option<&AtomicBool>,
    ) -> Result<LoopSummary, InvokerError>
    where
        T: Invocable,
        R: RandomSource + ?Sized,
        Obs: InvocationObserver<T::Output> + ?Sized,
    {
        if tests.len() < 2 {
            return Err(InvokerError::TooFewTests { found: tests.len() });
        }

        let mut summary = LoopSummary::default();

        for iteration in 0..self.iterations {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                debug!(iteration, "weighted loop cancelled");
                summary.cancelled = true;
                break;
            }

            let sample = rng.next_unit();
            let selected = select(sample, self.threshold);
            let test = &tests[selected];
            trace!(iteration, sample, selected, test = %test.id(), "invoking");

            let started = Instant::now();
            let outcome = test.invoke().map_err(|source| InvokerError::Invocation {
                iteration,
                test: test.id(),
                source,
            })?;
            let elapsed = started.elapsed();

            summary.invocations += 1;
            summary.selections[selected] += 1;

            observer.observe(&InvocationRecord {
                iteration,
                selected,
                test: test.id(),
                elapsed,
                outcome: &outcome,
            });
        }

        Ok(summary)
    }
}
