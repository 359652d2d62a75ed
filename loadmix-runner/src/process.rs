//! Worker process: runs one worker per configured thread and merges results.
//!
//! Tests are built by a factory on each worker's own thread, so invocables
//! never cross threads and need not be `Send`. Only the reports come back.

use std::sync::atomic::AtomicBool;
use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

use loadmix_core::http::{build_client, HttpTest};
use loadmix_core::{
    Invocable, InvocationError, InvokerError, SeedHierarchy, StatisticsSet, TestId,
    ThreadContext, WeightedInvoker,
};

use crate::config::{ScenarioConfig, TestSpec};
use crate::report::ProcessReport;
use crate::worker::{run_worker, WorkerError, WorkerOptions, WorkerReport};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("invalid scenario: {0}")]
    Invoker(#[from] InvokerError),
    #[error("thread pool: {0}")]
    ThreadPool(String),
    #[error("thread {thread} could not build its tests: {source}")]
    Build {
        thread: u32,
        #[source]
        source: InvocationError,
    },
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Run the scenario across `config.process.threads` worker threads.
///
/// `factory` builds one thread's tests from the configured specs.
pub fn run_process<T, F>(
    config: &ScenarioConfig,
    factory: F,
    cancel: Option<&AtomicBool>,
) -> Result<ProcessReport, ProcessError>
where
    T: Invocable,
    F: Fn(&ThreadContext, &[TestSpec]) -> Result<Vec<T>, InvocationError> + Sync,
{
    let invoker = WeightedInvoker::new(config.scenario.iterations, config.scenario.threshold)?;
    let seeds = SeedHierarchy::new(config.scenario.seed);
    let options = WorkerOptions {
        runs: config.process.runs,
        initial_sleep: config.process.initial_sleep(),
        smoke_check: config.scenario.smoke_check,
    };
    let threads = config.process.threads;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads as usize)
        .thread_name(|i| format!("loadmix-worker-{i}"))
        .build()
        .map_err(|e| ProcessError::ThreadPool(e.to_string()))?;

    info!(
        process = %config.process.id,
        threads,
        iterations = invoker.iterations(),
        threshold = invoker.threshold(),
        "starting scenario '{}'",
        config.scenario.name
    );

    let started_at = chrono::Utc::now();
    let start_time = Instant::now();

    let results: Vec<Result<WorkerReport, ProcessError>> = pool.install(|| {
        (0..threads)
            .into_par_iter()
            .with_max_len(1)
            .map(|thread_id| -> Result<WorkerReport, ProcessError> {
                let ctx = ThreadContext::new(config.process.id.clone(), thread_id);
                let tests = factory(&ctx, &config.tests).map_err(|source| ProcessError::Build {
                    thread: thread_id,
                    source,
                })?;
                Ok(run_worker(&ctx, &tests, &invoker, &seeds, &options, cancel)?)
            })
            .collect()
    });

    let mut workers = Vec::with_capacity(results.len());
    for result in results {
        workers.push(result?);
    }
    workers.sort_by_key(|w| w.thread_id);

    let mut totals = StatisticsSet::new();
    for worker in &workers {
        totals.merge(&worker.statistics);
    }

    let report = ProcessReport::new(
        config,
        started_at,
        start_time.elapsed().as_secs_f64(),
        workers,
        totals,
    );
    info!(
        runs_completed = report.runs_completed,
        runs_aborted = report.runs_aborted,
        invocations = report.invocations,
        "scenario finished"
    );
    Ok(report)
}

/// Factory for HTTP tests: one shared client per worker thread.
pub fn http_tests(
    config: &ScenarioConfig,
) -> impl Fn(&ThreadContext, &[TestSpec]) -> Result<Vec<HttpTest>, InvocationError> + Sync + '_ {
    move |ctx: &ThreadContext, specs: &[TestSpec]| {
        let client = build_client(config.process.timeout()).map_err(|e| InvocationError::Other {
            test: specs.first().map_or(TestId(0), |s| s.id),
            message: format!("build HTTP client for {ctx}: {e}"),
        })?;
        Ok(specs
            .iter()
            .map(|spec| {
                HttpTest::with_client(
                    spec.id,
                    spec.description.clone(),
                    spec.url.clone(),
                    client.clone(),
                )
            })
            .collect())
    }
}
