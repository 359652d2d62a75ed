//! Process reports: JSON and CSV export.
//!
//! - **JSON**: the full [`ProcessReport`], with a schema version
//! - **CSV**: one row per test with counts, success rate and mean time

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use loadmix_core::{StatisticsSet, TestId};

use crate::config::ScenarioConfig;
use crate::worker::WorkerReport;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub process_id: String,
    pub scenario: String,
    pub threshold: f64,
    pub iterations: usize,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub invocations: u64,
    /// Calls that failed with an invocation error, across all tests.
    #[serde(default)]
    pub errors: u64,
    pub threads: Vec<WorkerReport>,
    pub totals: StatisticsSet,
    /// Descriptions keyed by test id, for readable exports.
    pub descriptions: Vec<(TestId, String)>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ProcessReport {
    pub fn new(
        config: &ScenarioConfig,
        started_at: DateTime<Utc>,
        elapsed_secs: f64,
        threads: Vec<WorkerReport>,
        totals: StatisticsSet,
    ) -> Self {
        let runs_completed = threads.iter().map(|t| t.runs_completed).sum();
        let runs_aborted = threads.iter().map(|t| t.runs_aborted).sum();
        let invocations = threads.iter().map(|t| t.invocations).sum();
        let errors = totals.total().errors;
        Self {
            schema_version: SCHEMA_VERSION,
            process_id: config.process.id.clone(),
            scenario: config.scenario.name.clone(),
            threshold: config.scenario.threshold,
            iterations: config.scenario.iterations,
            seed: config.scenario.seed,
            started_at,
            elapsed_secs,
            runs_completed,
            runs_aborted,
            invocations,
            errors,
            threads,
            totals,
            descriptions: config
                .tests
                .iter()
                .map(|t| (t.id, t.description.clone()))
                .collect(),
        }
    }

    pub fn description(&self, test: TestId) -> &str {
        self.descriptions
            .iter()
            .find(|(id, _)| *id == test)
            .map_or("", |(_, d)| d.as_str())
    }

    pub fn cancelled(&self) -> bool {
        self.threads.iter().any(|t| t.cancelled)
    }
}

/// Serialize a report to pretty JSON.
pub fn export_json(report: &ProcessReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize ProcessReport to JSON")
}

/// Deserialize a report, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<ProcessReport> {
    let report: ProcessReport =
        serde_json::from_str(json).context("failed to deserialize ProcessReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

/// Per-test statistics as CSV.
///
/// Columns: test, description, invocations, successes, failures, errors,
/// success_rate, mean_time_ms, total_time_us
pub fn export_statistics_csv(report: &ProcessReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "test",
        "description",
        "invocations",
        "successes",
        "failures",
        "errors",
        "success_rate",
        "mean_time_ms",
        "total_time_us",
    ])?;

    for (id, stats) in report.totals.iter() {
        wtr.write_record(&[
            id.to_string(),
            report.description(id).to_string(),
            stats.invocations.to_string(),
            stats.successes.to_string(),
            stats.failures.to_string(),
            stats.errors.to_string(),
            stats
                .success_rate()
                .map_or(String::new(), |r| format!("{r:.4}")),
            stats
                .mean_time_ms()
                .map_or(String::new(), |m| format!("{m:.3}")),
            stats.total_time_us.to_string(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

pub fn write_json(report: &ProcessReport, path: &Path) -> Result<()> {
    let json = export_json(report)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_statistics_csv(report: &ProcessReport, path: &Path) -> Result<()> {
    let csv = export_statistics_csv(report)?;
    std::fs::write(path, csv).with_context(|| format!("failed to write {}", path.display()))
}
