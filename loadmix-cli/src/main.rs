//! loadmix CLI: run and check traffic-mix scenarios.
//!
//! Commands:
//! - `run`: execute a scenario file against its HTTP tests
//! - `check`: validate a scenario file and list its tests

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use loadmix_core::describe;
use loadmix_runner::{
    http_tests, run_process, write_json, write_statistics_csv, ProcessReport, ScenarioConfig,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "loadmix",
    about = "loadmix, a weighted traffic-mix load generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a scenario file.
    Run {
        /// Path to a TOML scenario file.
        #[arg(long)]
        config: PathBuf,

        /// Override the number of worker threads.
        #[arg(long)]
        threads: Option<u32>,

        /// Override runs per thread (0 = until interrupted).
        #[arg(long)]
        runs: Option<u64>,

        /// Override the master seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full report as JSON.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Write per-test statistics as CSV.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Validate a scenario file and list its tests.
    Check {
        /// Path to a TOML scenario file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            threads,
            runs,
            seed,
            json,
            csv,
        } => run_scenario(config, threads, runs, seed, json, csv),
        Commands::Check { config } => check_scenario(config),
    }
}

fn load(path: &Path) -> Result<ScenarioConfig> {
    ScenarioConfig::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn run_scenario(
    config_path: PathBuf,
    threads: Option<u32>,
    runs: Option<u64>,
    seed: Option<u64>,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
) -> Result<()> {
    let mut config = load(&config_path)?;
    if let Some(threads) = threads {
        config.process.threads = threads;
    }
    if let Some(runs) = runs {
        config.process.runs = runs;
    }
    if let Some(seed) = seed {
        config.scenario.seed = seed;
    }
    config.validate()?;

    let interrupted = install_interrupt_handler()?;
    let report = run_process(&config, http_tests(&config), Some(&*interrupted))?;
    print_summary(&report);

    if let Some(path) = json {
        write_json(&report, &path)?;
        info!(path = %path.display(), "report saved");
    }
    if let Some(path) = csv {
        write_statistics_csv(&report, &path)?;
        info!(path = %path.display(), "statistics saved");
    }
    Ok(())
}

/// First Ctrl+C sets the returned flag so workers finish their current
/// invocation and the report is still written. A second Ctrl+C exits at once.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("loadmix-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("received Ctrl+C, stopping after current invocations");
                flag.store(true, Ordering::Relaxed);

                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("received second Ctrl+C, aborting");
                    std::process::exit(130);
                }
            });
        })
        .context("failed to spawn signal thread")?;

    Ok(interrupted)
}

fn check_scenario(config_path: PathBuf) -> Result<()> {
    let config = load(&config_path)?;
    let factory = http_tests(&config);
    let ctx = loadmix_core::ThreadContext::new(config.process.id.clone(), 0);
    let tests = factory(&ctx, &config.tests)?;

    println!(
        "Scenario '{}': {} iterations, threshold {}, seed {}",
        config.scenario.name, config.scenario.iterations, config.scenario.threshold, config.scenario.seed
    );
    println!(
        "Process '{}': {} thread(s), {} run(s) each",
        config.process.id,
        config.process.threads,
        if config.process.runs == 0 {
            "unbounded".to_string()
        } else {
            config.process.runs.to_string()
        }
    );
    for (i, test) in tests.iter().enumerate() {
        let role = match i {
            0 => "first",
            1 => "second",
            _ => "unused",
        };
        println!("  [{role}] {} GET {}", describe(test), test.url());
    }
    Ok(())
}

fn print_summary(report: &ProcessReport) {
    println!("=== {} ({}) ===", report.scenario, report.process_id);
    println!(
        "Runs: {} completed, {} aborted  |  Invocations: {}  |  Errors: {}  |  Elapsed: {:.2}s",
        report.runs_completed,
        report.runs_aborted,
        report.invocations,
        report.errors,
        report.elapsed_secs
    );
    for (id, stats) in report.totals.iter() {
        println!(
            "  Test {:>4} {:<24} calls {:>7}  ok {:>7}  failed {:>7}  errors {:>5}  mean {}",
            id.0,
            report.description(id),
            stats.invocations,
            stats.successes,
            stats.failures,
            stats.errors,
            stats
                .mean_time_ms()
                .map_or("-".to_string(), |m| format!("{m:.2}ms")),
        );
    }
    if report.cancelled() {
        println!("(cancelled)");
    }
}
