// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::runner::RunResult;
use chrono::{DateTime, Utc};
use harness_metadata::{
    AggregateStats, ConciseSummary, ConciseTestRecord, FailingTestDiagnostic, HostInfo,
    OutcomeStatus, RunDiagnostics, TestCounts, VerboseReport, VerboseTestRecord,
};

/// Facts about a run that don't come from its results.
#[derive(Clone, Debug)]
pub struct RunInfo {
    /// When the run started.
    pub run_timestamp: DateTime<Utc>,

    /// When the run finished.
    pub finished_at: DateTime<Utc>,

    /// Wall-clock time for the whole run, in milliseconds.
    pub wall_time_ms: u64,

    /// The profile the run used.
    pub profile: String,

    /// The concurrency limit.
    pub test_threads: usize,

    /// Whether failing test files were retried.
    pub retry_enabled: bool,

    /// The execution mode, as displayed.
    pub execution_mode: String,

    /// The test command template, as displayed.
    pub command: String,
}

/// The documents derived from a run's results by [`aggregate`].
#[derive(Clone, Debug)]
pub struct Aggregated {
    /// Statistics over every final outcome.
    pub stats: AggregateStats,

    /// The summary printed on stdout. Report paths are filled in once the reports are persisted.
    pub summary: ConciseSummary,

    /// The verbose report with every attempt.
    pub report: VerboseReport,

    /// The diagnostics snapshot.
    pub diagnostics: RunDiagnostics,
}

/// Computes statistics and report documents from the results of a run.
///
/// Results are sorted by identifier. Counts and durations are summed over final outcomes that
/// were decoded; undecodable final outcomes only count towards `failedFiles`.
pub fn aggregate(mut results: Vec<RunResult>, info: &RunInfo) -> Aggregated {
    results.sort_by(|a, b| a.identifier().cmp(b.identifier()));

    let stats = compute_stats(&results);

    let summary = ConciseSummary {
        stats,
        tests: results.iter().map(concise_record).collect(),
        report_path: None,
        diagnostics_path: None,
        markdown_path: None,
    };

    let diagnostics = RunDiagnostics {
        run_timestamp: info.run_timestamp,
        started_at: info.run_timestamp,
        finished_at: info.finished_at,
        wall_time_ms: info.wall_time_ms,
        test_threads: info.test_threads,
        retry_enabled: info.retry_enabled,
        execution_mode: info.execution_mode.clone(),
        command: info.command.clone(),
        host: HostInfo::current(),
        failing: results
            .iter()
            .filter(|result| !result.is_success())
            .map(|result| {
                let last = result.last_attempt();
                FailingTestDiagnostic {
                    identifier: result.identifier().clone(),
                    attempts: result.attempt_count(),
                    last_error: last.error_message().map(ToOwned::to_owned),
                    last_exit_code: last.exit_code,
                }
            })
            .collect(),
    };

    let report = VerboseReport {
        run_timestamp: info.run_timestamp,
        harness_version: env!("CARGO_PKG_VERSION").to_owned(),
        profile: info.profile.clone(),
        stats,
        tests: results
            .into_iter()
            .map(|result| VerboseTestRecord {
                identifier: result.identifier().clone(),
                success: result.is_success(),
                final_attempt: result.final_outcome().attempt,
                attempts: result.into_attempts(),
            })
            .collect(),
    };

    Aggregated {
        stats,
        summary,
        report,
        diagnostics,
    }
}

fn compute_stats(results: &[RunResult]) -> AggregateStats {
    let mut stats = AggregateStats {
        total_test_files: results.len(),
        ..Default::default()
    };
    let mut totals = TestCounts::default();

    for result in results {
        let final_outcome = result.final_outcome();
        let success = final_outcome.is_passing();
        if success {
            stats.passed_files += 1;
        } else {
            stats.failed_files += 1;
        }

        if let OutcomeStatus::Decoded {
            counts,
            duration_ms,
        } = &final_outcome.status
        {
            totals += *counts;
            stats.total_duration_ms = stats.total_duration_ms.saturating_add(*duration_ms);
        }

        if result.was_retried() {
            stats.retried_count += 1;
            if success {
                stats.retried_passed_count += 1;
            } else {
                stats.retried_still_failing_count += 1;
            }
        }
    }

    stats.total_tests = totals.tests;
    stats.total_passed = totals.passed;
    stats.total_failed = totals.failed;
    stats.total_skipped = totals.skipped;
    stats.total_slow = totals.slow;
    stats.total_assertions = totals.assertions;
    stats.overall_success = stats.failed_files == 0;
    stats
}

fn concise_record(result: &RunResult) -> ConciseTestRecord {
    let final_outcome = result.final_outcome();
    ConciseTestRecord {
        identifier: result.identifier().clone(),
        success: final_outcome.is_passing(),
        attempts: result.attempt_count(),
        counts: final_outcome.counts().copied(),
        duration_ms: final_outcome.duration_ms(),
        artifact_refs: final_outcome.artifact_refs.clone(),
        error: final_outcome.error_message().map(ToOwned::to_owned),
    }
}
