// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that run the `harness` binary against shell-script test files.

#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::{Utf8TempDir, tempdir};
use harness_metadata::{ConciseSummary, ErrorSummary, RunDiagnostics, TestId, VerboseReport};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::process::{Command, Output};

const CONFIG: &str = indoc! {r#"
    [discover]
    include = ["**/*.test.sh"]

    [profile.default]
    command = "sh {test}"
    test-threads = 2
    timeout = "20s"

    [profile.ci]
    markdown-summary = true
"#};

const PASS: &str = indoc! {r#"
    echo 'starting'
    echo '{"tests": 3, "passed": 3, "failed": 0, "assertions": 7, "duration": 40}'
"#};

const FAIL: &str = indoc! {r#"
    echo '{"tests": 2, "passed": 1, "failed": 1, "duration": 25}'
    exit 1
"#};

const FLAKY: &str = indoc! {r#"
    if [ "$HARNESS_ATTEMPT" = 1 ]; then
        echo '{"tests": 1, "passed": 0, "failed": 1}'
        exit 1
    fi
    echo '{"tests": 1, "passed": 1, "failed": 0, "reportFile": "flaky.html"}'
"#};

const GARBAGE: &str = indoc! {r#"
    echo 'Error: browser disconnected' >&2
    exit 3
"#};

struct TempProject {
    dir: Utf8TempDir,
}

impl TempProject {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempdir().unwrap();
        let project = Self { dir };
        project.write(".config/harness.toml", CONFIG);
        for (path, contents) in files {
            project.write(path, contents);
        }
        project
    }

    fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    fn write(&self, path: &str, contents: &str) {
        let path = self.root().join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn harness(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_harness"))
            .args(args)
            .current_dir(self.root())
            .env("HARNESS_COLOR", "never")
            .env_remove("HARNESS_PROFILE")
            .env_remove("HARNESS_LOG")
            .env_remove("HARNESS_TEST_THREADS")
            .env_remove("HARNESS_VERBOSE")
            .output()
            .unwrap()
    }

    fn reports_dir(&self, profile: &str) -> Utf8PathBuf {
        self.root().join("target/harness").join(profile).join("reports")
    }
}

fn summary(output: &Output) -> ConciseSummary {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not a summary ({err}):\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        )
    })
}

fn ids(summary: &ConciseSummary) -> Vec<&str> {
    summary.tests.iter().map(|t| t.identifier.as_str()).collect()
}

#[test]
fn all_passing() {
    let project = TempProject::new(&[
        ("tests/a.test.sh", PASS),
        ("tests/b.test.sh", PASS),
        ("tests/helper.sh", FAIL),
    ]);
    let output = project.harness(&["run"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let summary = summary(&output);
    assert!(summary.stats.overall_success);
    assert_eq!(ids(&summary), ["tests/a.test.sh", "tests/b.test.sh"]);
    assert_eq!(summary.stats.total_tests, 6);
    assert_eq!(summary.stats.total_assertions, 14);
    assert_eq!(summary.stats.total_duration_ms, 80);
    assert_eq!(summary.stats.retried_count, 0);

    let report_path = summary.report_path.expect("report written");
    assert!(report_path.starts_with(project.reports_dir("default")));
    let report: VerboseReport =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report.stats, summary.stats);
    assert_eq!(report.profile, "default");
}

#[test]
fn flaky_file_passes_on_retry() {
    let project = TempProject::new(&[("tests/a.test.sh", PASS), ("tests/flaky.test.sh", FLAKY)]);
    let output = project.harness(&["run"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let summary = summary(&output);
    assert!(summary.stats.overall_success);
    assert_eq!(summary.stats.retried_count, 1);
    assert_eq!(summary.stats.retried_passed_count, 1);
    let flaky = &summary.tests[1];
    assert_eq!(flaky.identifier, TestId::new("tests/flaky.test.sh"));
    assert_eq!(flaky.attempts, 2);
    assert_eq!(flaky.artifact_refs, ["flaky.html"]);
}

#[test]
fn failures_exit_nonzero() {
    let project = TempProject::new(&[
        ("tests/a.test.sh", PASS),
        ("tests/fail.test.sh", FAIL),
        ("tests/garbage.test.sh", GARBAGE),
    ]);
    let output = project.harness(&["run"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let summary = summary(&output);
    assert!(!summary.stats.overall_success);
    assert_eq!(summary.stats.passed_files, 1);
    assert_eq!(summary.stats.failed_files, 2);
    assert_eq!(summary.stats.retried_still_failing_count, 2);
    // Only decoded final outcomes contribute counts.
    assert_eq!(summary.stats.total_tests, 5);

    let garbage = &summary.tests[2];
    assert_eq!(garbage.identifier, TestId::new("tests/garbage.test.sh"));
    assert_eq!(garbage.counts, None);
    assert!(
        garbage
            .error
            .as_deref()
            .is_some_and(|e| e.contains("no JSON object found")),
        "{garbage:?}"
    );

    let diagnostics_path = summary.diagnostics_path.expect("diagnostics written");
    let diagnostics: RunDiagnostics =
        serde_json::from_str(&std::fs::read_to_string(&diagnostics_path).unwrap()).unwrap();
    assert_eq!(diagnostics.failing.len(), 2);
    assert_eq!(diagnostics.failing[1].last_exit_code, Some(3));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: test run failed"), "{stderr}");
}

#[test]
fn no_retry_flag() {
    let project = TempProject::new(&[("tests/flaky.test.sh", FLAKY)]);
    let output = project.harness(&["run", "--no-retry", "-j", "1"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let summary = summary(&output);
    assert_eq!(summary.stats.retried_count, 0);
    assert_eq!(summary.tests[0].attempts, 1);
}

#[test]
fn path_argument_selects_files() {
    let project = TempProject::new(&[
        ("tests/unit/a.test.sh", PASS),
        ("tests/e2e/b.test.sh", FAIL),
    ]);
    let output = project.harness(&["run", "tests/unit"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(ids(&summary(&output)), ["tests/unit/a.test.sh"]);
}

#[test]
fn no_tests_default_fails_without_reports() {
    let project = TempProject::new(&[]);
    let output = project.harness(&["run"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let error: ErrorSummary = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(error, ErrorSummary::new("no test files found"));
    assert!(!project.reports_dir("default").exists());
}

#[test]
fn no_tests_pass_writes_empty_reports() {
    let project = TempProject::new(&[]);
    let output = project.harness(&["run", "--no-tests", "pass"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let summary = summary(&output);
    assert!(summary.stats.overall_success);
    assert!(summary.tests.is_empty());
    assert!(summary.report_path.expect("report written").exists());
}

#[test]
fn markdown_summary_and_reports_dir() {
    let project = TempProject::new(&[("tests/flaky.test.sh", FLAKY)]);
    let output = project.harness(&["-P", "ci", "run", "--reports-dir", "out"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");

    let summary = summary(&output);
    let markdown_path = summary.markdown_path.expect("markdown written");
    assert!(markdown_path.starts_with(project.root().join("out")));
    let markdown = std::fs::read_to_string(&markdown_path).unwrap();
    assert!(markdown.contains("## Passed on retry"), "{markdown}");
}

#[test]
fn list_json() {
    let project = TempProject::new(&[("tests/b.test.sh", PASS), ("tests/a.test.sh", PASS)]);
    let output = project.harness(&["list", "--message-format", "json"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let listed: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed, ["tests/a.test.sh", "tests/b.test.sh"]);
}

#[test]
fn bad_config_is_reported() {
    let project = TempProject::new(&[("tests/a.test.sh", PASS)]);
    project.write(".config/harness.toml", "[profile.default]\nretry = \"sometimes\"\n");
    let output = project.harness(&["run"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let error: ErrorSummary = serde_json::from_slice(&output.stdout).unwrap();
    assert!(!error.success);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error: failed to parse harness config"),
        "{stderr}"
    );
}

#[test]
fn bad_arguments_exit_one_with_summary() {
    let project = TempProject::new(&[("tests/a.test.sh", PASS)]);
    let output = project.harness(&["run", "--limit", "0"]);
    assert_eq!(output.status.code(), Some(1), "{output:?}");

    let error: ErrorSummary = serde_json::from_slice(&output.stdout).unwrap();
    assert!(!error.success);
    assert!(
        error.error.starts_with("invalid arguments: invalid value '0'"),
        "{error:?}"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("must not be zero"), "{stderr}");
}

#[test]
fn help_exits_zero() {
    let project = TempProject::new(&[]);
    let output = project.harness(&["--help"]);
    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}
