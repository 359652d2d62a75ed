//! Worker thread: repeats the scenario for a number of runs.
//!
//! Each run:
//! 1. Optionally invokes the first test once as a smoke check
//! 2. Runs the weighted loop with a run-specific seeded RNG
//!
//! Before the first run the worker sleeps for a random time up to
//! `initial_sleep`, drawn from its own seeded stream, so threads start
//! staggered.
//!
//! An invocation error aborts the current run only. It is logged, counted
//! against the failing test, and the worker moves on to the next run.
//! `runs = 0` repeats until the cancel flag is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use loadmix_core::{
    describe, Invocable, InvokerError, Outcome, RandomSource, SeedHierarchy, StatisticsSet,
    ThreadContext, WeightedInvoker,
};

/// Granularity of cancellable sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("thread {thread} cannot start: {source}")]
    Precondition {
        thread: String,
        #[source]
        source: InvokerError,
    },
}

/// Per-thread run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Runs to perform; 0 runs until cancelled.
    pub runs: u64,
    /// Upper bound of the random start-up delay.
    pub initial_sleep: Duration,
    pub smoke_check: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            runs: 1,
            initial_sleep: Duration::ZERO,
            smoke_check: false,
        }
    }
}

/// What one worker thread did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub thread_id: u32,
    pub runs_completed: u64,
    pub runs_aborted: u64,
    /// Calls that returned an outcome, including smoke checks and the calls
    /// of aborted runs. Always equal to `statistics.total().invocations`.
    pub invocations: u64,
    pub smoke_failures: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    pub statistics: StatisticsSet,
}

impl WorkerReport {
    pub fn runs_started(&self) -> u64 {
        self.runs_completed + self.runs_aborted
    }
}

/// Run the scenario on the current thread.
///
/// `tests` are owned by the caller and borrowed for every run. Each run draws
/// from `seeds.rng_for(process, thread, run)`, so a given run replays the same
/// traffic mix regardless of what other threads do.
pub fn run_worker<T>(
    ctx: &ThreadContext,
    tests: &[T],
    invoker: &WeightedInvoker,
    seeds: &SeedHierarchy,
    options: &WorkerOptions,
    cancel: Option<&AtomicBool>,
) -> Result<WorkerReport, WorkerError>
where
    T: Invocable,
{
    let span = ctx.span();
    let _entered = span.enter();

    if tests.len() < 2 {
        return Err(WorkerError::Precondition {
            thread: ctx.to_string(),
            source: InvokerError::TooFewTests { found: tests.len() },
        });
    }

    let start_time = Instant::now();
    let mut report = WorkerReport {
        thread_id: ctx.thread_id(),
        ..WorkerReport::default()
    };

    info!("hello from thread {ctx}");
    for test in tests {
        debug!("{}", describe(test));
    }

    let delay = initial_delay(
        options.initial_sleep,
        &mut seeds.startup_rng(ctx.process_id(), ctx.thread_id()),
    );
    if !delay.is_zero() {
        info!("sleeping for {} ms", delay.as_millis());
    }
    if sleep_cancellable(delay, cancel) {
        report.cancelled = true;
        report.elapsed_secs = start_time.elapsed().as_secs_f64();
        info!("cancelled during initial sleep");
        return Ok(report);
    }

    if options.runs == 0 {
        info!("about to run until cancelled");
    } else {
        info!(
            "about to do {} run{}",
            options.runs,
            if options.runs == 1 { "" } else { "s" }
        );
    }

    let mut run: u64 = 0;
    while options.runs == 0 || run < options.runs {
        if is_cancelled(cancel) {
            report.cancelled = true;
            break;
        }

        let run_span = ctx.run_span(run);
        let _run_entered = run_span.enter();

        match run_once(ctx, tests, invoker, seeds, options, cancel, run, &mut report) {
            Ok(cancelled) => {
                report.runs_completed += 1;
                if cancelled {
                    report.cancelled = true;
                    break;
                }
            }
            Err(InvokerError::TooFewTests { found }) => {
                // Checked above; unreachable for a fixed test slice.
                return Err(WorkerError::Precondition {
                    thread: ctx.to_string(),
                    source: InvokerError::TooFewTests { found },
                });
            }
            Err(e) => {
                if let InvokerError::Invocation { test, .. } = &e {
                    report.statistics.record_error(*test);
                }
                report.runs_aborted += 1;
                error!("aborted run due to {e}");
            }
        }

        run += 1;
    }

    report.invocations = report.statistics.total().invocations;
    report.elapsed_secs = start_time.elapsed().as_secs_f64();
    let finished = report.runs_started();
    info!(
        "finished {finished} run{}",
        if finished == 1 { "" } else { "s" }
    );
    Ok(report)
}

/// One run. Returns whether the weighted loop was cancelled part-way.
#[allow(clippy::too_many_arguments)]
fn run_once<T: Invocable>(
    ctx: &ThreadContext,
    tests: &[T],
    invoker: &WeightedInvoker,
    seeds: &SeedHierarchy,
    options: &WorkerOptions,
    cancel: Option<&AtomicBool>,
    run: u64,
    report: &mut WorkerReport,
) -> Result<bool, InvokerError> {
    if options.smoke_check {
        let first = &tests[0];
        let started = Instant::now();
        let outcome = first.invoke().map_err(|source| InvokerError::Invocation {
            iteration: 0,
            test: first.id(),
            source,
        })?;
        let successful = outcome.is_successful();
        report
            .statistics
            .record(first.id(), successful, started.elapsed());
        if successful {
            info!("{} worked", describe(first));
        } else {
            report.smoke_failures += 1;
            warn!("{} failed", describe(first));
        }
    }

    let mut rng = seeds.rng_for(ctx.process_id(), ctx.thread_id(), run);
    let summary = invoker.run_with(tests, &mut rng, &mut report.statistics, cancel)?;
    debug!(
        invocations = summary.invocations,
        first = summary.selections[0],
        second = summary.selections[1],
        "run complete"
    );
    Ok(summary.cancelled)
}

/// Flat random delay in `[0, max)`.
fn initial_delay<R: RandomSource + ?Sized>(max: Duration, rng: &mut R) -> Duration {
    if max.is_zero() {
        Duration::ZERO
    } else {
        max.mul_f64(rng.next_unit())
    }
}

fn is_cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Sleep in slices, returning `true` if cancelled before the time elapsed.
fn sleep_cancellable(duration: Duration, cancel: Option<&AtomicBool>) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if is_cancelled(cancel) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadmix_core::{InvocationError, TestId};
    use std::cell::{Cell, RefCell};

    /// Test double: records calls, fails on chosen global call numbers.
    struct Scripted<'a> {
        id: u32,
        calls: &'a RefCell<Vec<u32>>,
        fail_calls: &'a [usize],
        succeed: bool,
    }

    impl Invocable for Scripted<'_> {
        type Output = bool;

        fn id(&self) -> TestId {
            TestId(self.id)
        }

        fn invoke(&self) -> Result<bool, InvocationError> {
            let mut calls = self.calls.borrow_mut();
            let n = calls.len();
            calls.push(self.id);
            if self.fail_calls.contains(&n) {
                return Err(InvocationError::Other {
                    test: self.id(),
                    message: "injected".into(),
                });
            }
            Ok(self.succeed)
        }
    }

    fn pair<'a>(calls: &'a RefCell<Vec<u32>>, fail_calls: &'a [usize]) -> Vec<Scripted<'a>> {
        vec![
            Scripted {
                id: 1,
                calls,
                fail_calls,
                succeed: true,
            },
            Scripted {
                id: 2,
                calls,
                fail_calls,
                succeed: true,
            },
        ]
    }

    #[test]
    fn completes_every_run() {
        let calls = RefCell::new(Vec::new());
        let tests = pair(&calls, &[]);
        let options = WorkerOptions {
            runs: 3,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(5, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            None,
        )
        .unwrap();

        assert_eq!(report.runs_completed, 3);
        assert_eq!(report.runs_aborted, 0);
        assert_eq!(report.invocations, 15);
        assert_eq!(calls.borrow().len(), 15);
        assert_eq!(report.statistics.total().invocations, 15);
    }

    #[test]
    fn aborted_run_does_not_stop_the_worker() {
        let calls = RefCell::new(Vec::new());
        // Fail the 3rd call overall: inside run 0 (iterations 0..4).
        let tests = pair(&calls, &[2]);
        let options = WorkerOptions {
            runs: 2,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(4, 0.5).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            None,
        )
        .unwrap();

        assert_eq!(report.runs_aborted, 1);
        assert_eq!(report.runs_completed, 1);
        assert_eq!(report.runs_started(), 2);
        // Run 0 stops after its third call; run 1 performs all four.
        assert_eq!(calls.borrow().len(), 3 + 4);
        // The two calls before the failure still count.
        assert_eq!(report.invocations, 2 + 4);
        assert_eq!(report.invocations, report.statistics.total().invocations);

        // The failing call is an error against the test that raised it.
        let failed_test = TestId(calls.borrow()[2]);
        assert_eq!(report.statistics.get(failed_test).unwrap().errors, 1);
        assert_eq!(report.statistics.total().errors, 1);
    }

    #[test]
    fn failing_smoke_check_is_recorded_as_an_error() {
        let calls = RefCell::new(Vec::new());
        // The first call of each run is the smoke check; fail run 0's.
        let tests = pair(&calls, &[0]);
        let options = WorkerOptions {
            runs: 2,
            smoke_check: true,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(3, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            None,
        )
        .unwrap();

        assert_eq!(report.runs_aborted, 1);
        assert_eq!(report.runs_completed, 1);
        assert_eq!(calls.borrow().len(), 1 + (1 + 3));
        assert_eq!(report.invocations, 4);
        assert_eq!(report.invocations, report.statistics.total().invocations);
        assert_eq!(report.statistics.get(TestId(1)).unwrap().errors, 1);
    }

    #[test]
    fn initial_delay_is_bounded_and_seeded() {
        let seeds = SeedHierarchy::new(3);
        let max = Duration::from_millis(500);

        let first = initial_delay(max, &mut seeds.startup_rng("agent-0", 0));
        let again = initial_delay(max, &mut seeds.startup_rng("agent-0", 0));
        assert_eq!(first, again);
        assert!(first <= max);

        let delays: Vec<Duration> = (0..8)
            .map(|thread| initial_delay(max, &mut seeds.startup_rng("agent-0", thread)))
            .collect();
        assert!(delays.iter().any(|d| *d != first));

        assert_eq!(
            initial_delay(Duration::ZERO, &mut seeds.startup_rng("agent-0", 0)),
            Duration::ZERO
        );
    }

    #[test]
    fn smoke_check_invokes_first_test_each_run() {
        let calls = RefCell::new(Vec::new());
        let mut tests = pair(&calls, &[]);
        tests[0].succeed = false;
        let options = WorkerOptions {
            runs: 2,
            smoke_check: true,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(0, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            None,
        )
        .unwrap();

        assert_eq!(*calls.borrow(), vec![1, 1]);
        assert_eq!(report.smoke_failures, 2);
        assert_eq!(report.invocations, 2);
        assert_eq!(report.statistics.get(TestId(1)).unwrap().failures, 2);
    }

    #[test]
    fn same_seed_replays_same_mix() {
        let run = || {
            let calls = RefCell::new(Vec::new());
            let tests = pair(&calls, &[]);
            run_worker(
                &ThreadContext::new("agent-0", 4),
                &tests,
                &WeightedInvoker::new(50, 0.8).unwrap(),
                &SeedHierarchy::new(77),
                &WorkerOptions::default(),
                None,
            )
            .unwrap();
            calls.into_inner()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn cancel_before_start_runs_nothing() {
        let calls = RefCell::new(Vec::new());
        let tests = pair(&calls, &[]);
        let cancel = AtomicBool::new(true);
        let options = WorkerOptions {
            runs: 0,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(10, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            Some(&cancel),
        )
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.runs_started(), 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn unbounded_runs_stop_on_cancel() {
        struct CancelAfter<'a> {
            id: u32,
            cancel: &'a AtomicBool,
            remaining: &'a Cell<u32>,
        }
        impl Invocable for CancelAfter<'_> {
            type Output = bool;
            fn id(&self) -> TestId {
                TestId(self.id)
            }
            fn invoke(&self) -> Result<bool, InvocationError> {
                let left = self.remaining.get().saturating_sub(1);
                self.remaining.set(left);
                if left == 0 {
                    self.cancel.store(true, Ordering::Relaxed);
                }
                Ok(true)
            }
        }

        let cancel = AtomicBool::new(false);
        let remaining = Cell::new(7);
        let tests = [
            CancelAfter {
                id: 1,
                cancel: &cancel,
                remaining: &remaining,
            },
            CancelAfter {
                id: 2,
                cancel: &cancel,
                remaining: &remaining,
            },
        ];
        let options = WorkerOptions {
            runs: 0,
            ..WorkerOptions::default()
        };

        let report = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(3, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &options,
            Some(&cancel),
        )
        .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.invocations, 7);
        assert_eq!(report.runs_completed, 3);
    }

    #[test]
    fn too_few_tests_is_a_precondition_error() {
        let calls = RefCell::new(Vec::new());
        let mut tests = pair(&calls, &[]);
        tests.pop();

        let err = run_worker(
            &ThreadContext::new("agent-0", 0),
            &tests,
            &WeightedInvoker::new(1, 0.8).unwrap(),
            &SeedHierarchy::new(1),
            &WorkerOptions::default(),
            None,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::Precondition {
                source: InvokerError::TooFewTests { found: 1 },
                ..
            }
        ));
        assert!(calls.borrow().is_empty());
    }
}
