// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{TestCounts, TestId, TestOutcome};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics computed over the final outcome of every test file in a run.
///
/// Recomputed at the end of each run; never persisted on its own.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// The number of test files that were run.
    pub total_test_files: usize,

    /// The number of test files whose final outcome passed.
    pub passed_files: usize,

    /// The number of test files whose final outcome failed, including undecodable ones.
    pub failed_files: usize,

    /// The total number of tests across all decoded final outcomes.
    pub total_tests: u64,

    /// The total number of passing tests.
    pub total_passed: u64,

    /// The total number of failing tests.
    pub total_failed: u64,

    /// The total number of skipped tests.
    pub total_skipped: u64,

    /// The total number of slow tests.
    pub total_slow: u64,

    /// The total number of assertions.
    pub total_assertions: u64,

    /// The sum of reported durations, in milliseconds.
    pub total_duration_ms: u64,

    /// The number of test files that were retried.
    pub retried_count: usize,

    /// The number of retried test files that passed on retry.
    pub retried_passed_count: usize,

    /// The number of retried test files that failed again.
    pub retried_still_failing_count: usize,

    /// True if every test file's final outcome passed. Vacuously true for an empty run.
    #[serde(rename = "success")]
    pub overall_success: bool,
}

impl AggregateStats {
    /// Returns the totals as a [`TestCounts`].
    pub fn totals(&self) -> TestCounts {
        TestCounts {
            tests: self.total_tests,
            passed: self.total_passed,
            failed: self.total_failed,
            skipped: self.total_skipped,
            slow: self.total_slow,
            assertions: self.total_assertions,
        }
    }
}

/// The concise summary printed to stdout at the end of a run, intended for terminals and CI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConciseSummary {
    /// Aggregate statistics, including the overall `success` flag.
    #[serde(flatten)]
    pub stats: AggregateStats,

    /// One compact record per test file, sorted by identifier.
    pub tests: Vec<ConciseTestRecord>,

    /// Where the verbose report was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<Utf8PathBuf>,

    /// Where the diagnostics snapshot was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_path: Option<Utf8PathBuf>,

    /// Where the Markdown summary was written, if enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_path: Option<Utf8PathBuf>,
}

impl ConciseSummary {
    /// Returns true if the run succeeded.
    pub fn is_success(&self) -> bool {
        self.stats.overall_success
    }
}

/// A compact per-file record in a [`ConciseSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConciseTestRecord {
    /// The test file.
    pub identifier: TestId,

    /// Whether the final outcome passed.
    pub success: bool,

    /// How many attempts were made (1 or 2).
    pub attempts: usize,

    /// Counts from the final outcome, if it was decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counts: Option<TestCounts>,

    /// Duration from the final outcome, if it was decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Artifacts produced by the final attempt.
    pub artifact_refs: Vec<String>,

    /// The decode error of the final outcome, if it was undecodable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The verbose report archived under the reports directory.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerboseReport {
    /// When the run started.
    pub run_timestamp: DateTime<Utc>,

    /// The version of the harness that produced this report.
    pub harness_version: String,

    /// The configuration profile used for the run.
    pub profile: String,

    /// Aggregate statistics, including the overall `success` flag.
    #[serde(flatten)]
    pub stats: AggregateStats,

    /// Full attempt history for every test file, sorted by identifier.
    pub tests: Vec<VerboseTestRecord>,
}

/// A per-file record in a [`VerboseReport`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerboseTestRecord {
    /// The test file.
    pub identifier: TestId,

    /// Whether the final outcome passed.
    pub success: bool,

    /// The attempt number of the outcome that was reported.
    pub final_attempt: u32,

    /// Every attempt, in order.
    pub attempts: Vec<TestOutcome>,
}

/// A snapshot of how a run was set up and how it went, for debugging the harness itself.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    /// When the run started.
    pub run_timestamp: DateTime<Utc>,

    /// When the run started, as observed on the local clock.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub finished_at: DateTime<Utc>,

    /// Wall-clock time for the whole run, in milliseconds.
    pub wall_time_ms: u64,

    /// The concurrency limit that was used.
    pub test_threads: usize,

    /// Whether failing test files were retried.
    pub retry_enabled: bool,

    /// `headless` or `attach`.
    pub execution_mode: String,

    /// The command template test processes were launched with.
    pub command: String,

    /// The host the run happened on.
    pub host: HostInfo,

    /// Test files whose final outcome failed.
    pub failing: Vec<FailingTestDiagnostic>,
}

/// Host information recorded in [`RunDiagnostics`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    /// The operating system.
    pub os: String,

    /// The CPU architecture.
    pub arch: String,
}

impl HostInfo {
    /// Returns information about the current host.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
        }
    }
}

/// A failing test file recorded in [`RunDiagnostics`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailingTestDiagnostic {
    /// The test file.
    pub identifier: TestId,

    /// How many attempts were made.
    pub attempts: usize,

    /// The decode error of the last attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// The exit code of the last attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
}

/// The payload printed to stdout in place of a [`ConciseSummary`] when the harness itself fails.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Always false.
    pub success: bool,

    /// A description of the failure.
    pub error: String,
}

impl ErrorSummary {
    /// Creates a new error summary.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn concise_summary_keys() {
        let summary = ConciseSummary {
            stats: AggregateStats {
                total_test_files: 3,
                passed_files: 3,
                overall_success: true,
                ..Default::default()
            },
            tests: Vec::new(),
            report_path: Some("target/harness/reports/report-x.json".into()),
            diagnostics_path: None,
            markdown_path: None,
        };

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["totalTestFiles"], 3);
        assert_eq!(value["failedFiles"], 0);
        assert_eq!(value["retriedCount"], 0);
        assert_eq!(value["reportPath"], "target/harness/reports/report-x.json");
        assert!(value.get("diagnosticsPath").is_none());
        assert!(value.get("overallSuccess").is_none());
    }

    #[test]
    fn error_summary_shape() {
        let value = serde_json::to_value(ErrorSummary::new("no test files found")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "success": false, "error": "no test files found" })
        );
    }
}
