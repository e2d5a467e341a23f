// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunResult, retry_failures, schedule};
use crate::{
    config::{ConcurrencyLimit, HarnessProfile, NoTestsBehavior},
    errors::{ExecuteError, TestRunnerBuildError, TestRunnerExecuteError},
    executor::TestExecutor,
    helpers::{DisplayDurationSecs, plural},
    reporter::{Aggregated, ReportSink, RunInfo, aggregate, render_markdown},
    time::stopwatch,
};
use camino::Utf8PathBuf;
use harness_metadata::{ConciseSummary, HarnessExitCode, OutcomeStatus, TestId, TestOutcome};
use std::{num::NonZeroUsize, time::Duration};
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<ConcurrencyLimit>,
    retry: Option<bool>,
    no_tests: Option<NoTestsBehavior>,
    reports_dir: Option<Utf8PathBuf>,
}

impl TestRunnerBuilder {
    /// Sets the number of test files to run simultaneously, overriding the profile.
    ///
    /// In attach mode, test files always run one at a time regardless of this setting, since
    /// every attempt drives the same browser.
    pub fn set_test_threads(&mut self, test_threads: ConcurrencyLimit) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Sets whether failing test files are retried once, overriding the profile.
    pub fn set_retry(&mut self, retry: bool) -> &mut Self {
        self.retry = Some(retry);
        self
    }

    /// Sets what to do when there are no test files, overriding the profile.
    pub fn set_no_tests(&mut self, no_tests: NoTestsBehavior) -> &mut Self {
        self.no_tests = Some(no_tests);
        self
    }

    /// Sets the directory reports are written to, overriding the profile.
    ///
    /// A relative path is taken as-is, relative to the process's current directory. Resolve it
    /// against the config root first to match the profile's `reports-dir`.
    pub fn set_reports_dir(&mut self, reports_dir: impl Into<Utf8PathBuf>) -> &mut Self {
        self.reports_dir = Some(reports_dir.into());
        self
    }

    /// Creates a new test runner.
    pub fn build<X: TestExecutor>(
        self,
        profile: &HarnessProfile,
        executor: X,
    ) -> Result<TestRunner<X>, TestRunnerBuildError> {
        let test_threads = if profile.mode().is_shared() {
            if self.test_threads.is_some_and(|t| t.resolve().get() > 1) {
                warn!(
                    "{} runs against a shared browser, so test files will run one at a time",
                    profile.mode()
                );
            }
            NonZeroUsize::MIN
        } else {
            self.test_threads
                .unwrap_or_else(|| profile.test_threads())
                .resolve()
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("harness-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;

        Ok(TestRunner {
            profile: profile.clone(),
            test_threads,
            retry: self.retry.unwrap_or_else(|| profile.retry()),
            no_tests: self.no_tests.unwrap_or_else(|| profile.no_tests()),
            sink: ReportSink::new(self.reports_dir.unwrap_or_else(|| profile.reports_dir())),
            executor,
            runtime,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<X> {
    profile: HarnessProfile,
    test_threads: NonZeroUsize,
    retry: bool,
    no_tests: NoTestsBehavior,
    sink: ReportSink,
    executor: X,
    runtime: Runtime,
}

/// The result of a completed run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The summary to print, with the paths of the persisted reports filled in.
    pub summary: ConciseSummary,

    /// The exit code for the process.
    pub exit_code: i32,
}

impl<X: TestExecutor> TestRunner<X> {
    /// Returns the number of test files that will be run simultaneously.
    pub fn test_threads(&self) -> usize {
        self.test_threads.get()
    }

    /// Runs every test file, retries failures, and persists the reports.
    ///
    /// Test failures are part of the returned summary. An error is returned only if the harness
    /// itself failed: no test files and the no-tests behavior is `fail`, a test process could not
    /// be launched, or the reports could not be written.
    pub fn execute(self, ids: Vec<TestId>) -> Result<RunOutcome, TestRunnerExecuteError> {
        if ids.is_empty() {
            match self.no_tests {
                NoTestsBehavior::Fail => return Err(TestRunnerExecuteError::NoTestsRun),
                NoTestsBehavior::Warn => warn!("no test files to run"),
                NoTestsBehavior::Pass => {}
            }
        }

        let stopwatch = stopwatch();
        info!(
            "starting {} {} with {} {}",
            ids.len(),
            plural::test_files_str(ids.len()),
            self.test_threads,
            if self.test_threads.get() == 1 { "thread" } else { "threads" },
        );

        let res = self.runtime.block_on(self.run_all(ids));
        let snapshot = stopwatch.snapshot();
        // Don't wait for stray blocking tasks from tokio::fs to wind down.
        let TestRunner {
            profile,
            test_threads,
            retry,
            sink,
            runtime,
            ..
        } = self;
        runtime.shutdown_background();
        let results = res?;

        let info = RunInfo {
            run_timestamp: snapshot.start_time,
            finished_at: snapshot.end_time(),
            wall_time_ms: snapshot.duration_ms(),
            profile: profile.name().to_owned(),
            test_threads: test_threads.get(),
            retry_enabled: retry,
            execution_mode: profile.mode().to_string(),
            command: profile.command().to_string(),
        };
        let Aggregated {
            stats,
            mut summary,
            report,
            diagnostics,
        } = aggregate(results, &info);

        let markdown = profile
            .markdown_summary()
            .then(|| render_markdown(&summary));
        let persisted = sink.persist(
            &report,
            &diagnostics,
            info.run_timestamp,
            markdown.as_deref(),
        )?;
        summary.report_path = Some(persisted.report_path);
        summary.diagnostics_path = Some(persisted.diagnostics_path);
        summary.markdown_path = persisted.markdown_path;

        info!(
            "{} {} run in {}: {} passed, {} failed ({} retried, {} passed on retry)",
            stats.total_test_files,
            plural::test_files_str(stats.total_test_files),
            DisplayDurationSecs(snapshot.duration),
            stats.passed_files,
            stats.failed_files,
            stats.retried_count,
            stats.retried_passed_count,
        );

        let exit_code = if summary.is_success() {
            HarnessExitCode::OK
        } else {
            HarnessExitCode::TEST_RUN_FAILED
        };
        Ok(RunOutcome { summary, exit_code })
    }

    async fn run_all(&self, ids: Vec<TestId>) -> Result<Vec<RunResult>, ExecuteError> {
        let run_one = move |id: TestId, attempt: u32| async move {
            let outcome = self.executor.execute(id, attempt).await?;
            log_outcome(&outcome);
            Ok::<_, ExecuteError>(outcome)
        };

        let first_pass = schedule(ids, self.test_threads, 1, run_one).await?;
        if self.retry {
            retry_failures(first_pass, self.test_threads, run_one).await
        } else {
            Ok(first_pass.into_iter().map(RunResult::single).collect())
        }
    }
}

fn log_outcome(outcome: &TestOutcome) {
    let retry = if outcome.attempt > 1 { " (retry)" } else { "" };
    match &outcome.status {
        OutcomeStatus::Decoded {
            counts,
            duration_ms,
        } => {
            let status = if counts.failed == 0 { "PASS" } else { "FAIL" };
            info!(
                target: "harness_runner::outcome",
                "{status:>4} [{:>8}] {}{retry}: {} passed, {} failed, {} skipped",
                DisplayDurationSecs(Duration::from_millis(*duration_ms)),
                outcome.identifier,
                counts.passed,
                counts.failed,
                counts.skipped,
            );
        }
        OutcomeStatus::Undecodable { error_message, .. } => {
            info!(
                target: "harness_runner::outcome",
                "FAIL [{:>8}] {}{retry}: {error_message}",
                "-",
                outcome.identifier,
            );
        }
    }
}
