//! Scenario configuration loaded from TOML.
//!
//! ```toml
//! [scenario]
//! name = "security pages"
//! iterations = 10
//! threshold = 0.8
//! seed = 42
//! smoke_check = true
//!
//! [process]
//! id = "agent-0"
//! threads = 2
//! runs = 1
//!
//! [[tests]]
//! id = 1
//! url = "http://localhost:9001/security"
//!
//! [[tests]]
//! id = 2
//! url = "http://localhost:9001/security/welcome.jsp"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use loadmix_core::TestId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete scenario: traffic mix, process shape, and the tests to mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub scenario: MixConfig,
    #[serde(default)]
    pub process: ProcessConfig,
    pub tests: Vec<TestSpec>,
}

/// Weighted loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    #[serde(default)]
    pub name: String,
    /// Iterations of the weighted loop per run.
    pub iterations: usize,
    /// Samples above this pick the first test; the rest pick the second.
    pub threshold: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Invoke the first test once at the start of every run and log whether it worked.
    #[serde(default)]
    pub smoke_check: bool,
}

/// Worker process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    #[serde(default = "default_process_id")]
    pub id: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Runs per thread; 0 runs until cancelled.
    #[serde(default = "default_runs")]
    pub runs: u64,
    #[serde(default)]
    pub initial_sleep_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            id: default_process_id(),
            threads: default_threads(),
            runs: default_runs(),
            initial_sleep_ms: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ProcessConfig {
    pub fn initial_sleep(&self) -> Duration {
        Duration::from_millis(self.initial_sleep_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One HTTP test in the mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSpec {
    pub id: TestId,
    #[serde(default)]
    pub description: String,
    pub url: String,
}

fn default_seed() -> u64 {
    42
}

fn default_process_id() -> String {
    "agent-0".to_string()
}

fn default_threads() -> u32 {
    1
}

fn default_runs() -> u64 {
    1
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScenarioConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tests.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "need at least 2 tests, found {}",
                self.tests.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.scenario.threshold) {
            return Err(ConfigError::Invalid(format!(
                "threshold {} is outside [0, 1]",
                self.scenario.threshold
            )));
        }
        if self.process.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        if self.process.id.trim().is_empty() {
            return Err(ConfigError::Invalid("process id must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for test in &self.tests {
            if !seen.insert(test.id) {
                return Err(ConfigError::Invalid(format!("duplicate test id {}", test.id)));
            }
            if test.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("test {} has an empty url", test.id)));
            }
        }
        Ok(())
    }
}
