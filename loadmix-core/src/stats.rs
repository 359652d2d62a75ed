//! Per-test statistics.
//!
//! Counts invocations, successful and failed outcomes, errors and accumulated
//! invocation time per [`TestId`]. An invocation counts once it returns an
//! outcome; a call that fails with an `InvocationError` counts as an error
//! instead. Sets are merged additively, so worker
//! threads record independently and the process sums them at the end.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::invocable::{Outcome, TestId};
use crate::invoker::{InvocationObserver, InvocationRecord};

/// Statistics for a single test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TestStatistics {
    pub invocations: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls that returned an `InvocationError` and aborted their run.
    #[serde(default)]
    pub errors: u64,
    /// Sum of invocation times, in microseconds.
    pub total_time_us: u64,
}

impl TestStatistics {
    pub fn record(&mut self, successful: bool, elapsed: Duration) {
        self.invocations += 1;
        if successful {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_time_us = self
            .total_time_us
            .saturating_add(u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn merge(&mut self, other: &TestStatistics) {
        self.invocations += other.invocations;
        self.successes += other.successes;
        self.failures += other.failures;
        self.errors += other.errors;
        self.total_time_us = self.total_time_us.saturating_add(other.total_time_us);
    }

    /// Mean invocation time in milliseconds, `None` before the first call.
    pub fn mean_time_ms(&self) -> Option<f64> {
        if self.invocations == 0 {
            None
        } else {
            Some(self.total_time_us as f64 / self.invocations as f64 / 1000.0)
        }
    }

    pub fn success_rate(&self) -> Option<f64> {
        if self.invocations == 0 {
            None
        } else {
            Some(self.successes as f64 / self.invocations as f64)
        }
    }
}

/// Statistics for every test seen, ordered by test id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSet {
    tests: BTreeMap<TestId, TestStatistics>,
}

impl StatisticsSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, test: TestId, successful: bool, elapsed: Duration) {
        self.tests.entry(test).or_default().record(successful, elapsed);
    }

    pub fn record_error(&mut self, test: TestId) {
        self.tests.entry(test).or_default().record_error();
    }

    pub fn merge(&mut self, other: &StatisticsSet) {
        for (id, stats) in &other.tests {
            self.tests.entry(*id).or_default().merge(stats);
        }
    }

    pub fn get(&self, test: TestId) -> Option<&TestStatistics> {
        self.tests.get(&test)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TestId, &TestStatistics)> {
        self.tests.iter().map(|(id, s)| (*id, s))
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Totals across all tests.
    pub fn total(&self) -> TestStatistics {
        let mut total = TestStatistics::default();
        for stats in self.tests.values() {
            total.merge(stats);
        }
        total
    }
}

impl<O: Outcome> InvocationObserver<O> for StatisticsSet {
    fn observe(&mut self, record: &InvocationRecord<'_, O>) {
        self.record(record.test, record.outcome.is_successful(), record.elapsed);
    }
}
