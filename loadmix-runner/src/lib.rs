//! loadmix runner: scenario files, worker threads, process orchestration, reports.
//!
//! This crate builds on `loadmix-core` to provide:
//! - TOML scenario configuration with validation
//! - Worker threads that repeat the weighted loop for a number of runs
//! - A process that runs one worker per thread on a Rayon pool
//! - JSON and CSV reports

pub mod config;
pub mod process;
pub mod report;
pub mod worker;

pub use config::{ConfigError, MixConfig, ProcessConfig, ScenarioConfig, TestSpec};
pub use process::{http_tests, run_process, ProcessError};
pub use report::{
    export_json, export_statistics_csv, import_json, write_json, write_statistics_csv,
    ProcessReport, SCHEMA_VERSION,
};
pub use worker::{run_worker, WorkerError, WorkerOptions, WorkerReport};
