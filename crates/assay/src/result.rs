//! Per-test results and run summaries.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::config::serialize_ms_f64;
use crate::error::ErrorReport;
use crate::tree::TestId;

/// Outcome of one test in one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: TestId,
    /// Suite names and test name joined with `" > "`. Root tests use the bare name.
    pub spec: String,
    pub path: Vec<String>,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(serialize_with = "serialize_ms_f64")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after_each_hooks_errors: Vec<ErrorReport>,
}

impl TestResult {
    pub(crate) fn skipped(id: TestId, path: Vec<String>, reason: Option<String>) -> Self {
        TestResult {
            id,
            spec: path.join(" > "),
            path,
            passed: false,
            error: None,
            skipped: true,
            skip_reason: reason,
            duration: Duration::ZERO,
            after_each_hooks_errors: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        !self.passed && !self.skipped
    }
}

/// Totals over a result list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `"<spec>: <message>"` for each failure, in result order.
    pub failures: Vec<String>,
}

impl RunSummary {
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut summary = RunSummary::default();
        for result in results {
            if result.skipped {
                summary.skipped += 1;
            } else if result.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
                let message = result
                    .error
                    .as_ref()
                    .map(|e| e.local_message.as_str())
                    .unwrap_or("failed");
                summary.failures.push(format!("{}: {}", result.spec, message));
            }
        }
        summary
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            (self.passed > 0).then(|| format!("{} passed", self.passed)),
            (self.failed > 0).then(|| format!("{} failed", self.failed)),
            (self.skipped > 0).then(|| format!("{} skipped", self.skipped)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            f.write_str("no tests")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
