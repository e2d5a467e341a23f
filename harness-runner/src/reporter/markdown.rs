// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::helpers::{DisplayDurationSecs, plural};
use harness_metadata::ConciseSummary;
use std::time::Duration;
use swrite::{SWrite, swrite, swriteln};

/// Renders a Markdown summary of a run, suitable for a CI job summary.
pub fn render_markdown(summary: &ConciseSummary) -> String {
    let stats = &summary.stats;
    let mut out = String::new();

    swriteln!(out, "# Test run summary");
    out.push('\n');
    if stats.overall_success {
        swrite!(out, "**PASSED**: ");
    } else {
        swrite!(out, "**FAILED**: ");
    }
    swriteln!(
        out,
        "{} of {} {} passed",
        stats.passed_files,
        stats.total_test_files,
        plural::test_files_str(stats.total_test_files),
    );
    out.push('\n');

    swriteln!(out, "| Tests | Passed | Failed | Skipped | Slow | Assertions | Duration |");
    swriteln!(out, "|------:|-------:|-------:|--------:|-----:|-----------:|---------:|");
    swriteln!(
        out,
        "| {} | {} | {} | {} | {} | {} | {} |",
        stats.total_tests,
        stats.total_passed,
        stats.total_failed,
        stats.total_skipped,
        stats.total_slow,
        stats.total_assertions,
        DisplayDurationSecs(Duration::from_millis(stats.total_duration_ms)),
    );

    let failing: Vec<_> = summary.tests.iter().filter(|t| !t.success).collect();
    if !failing.is_empty() {
        out.push('\n');
        swriteln!(out, "## Failing");
        out.push('\n');
        for test in failing {
            swrite!(out, "- `{}`", test.identifier);
            match (&test.counts, &test.error) {
                (_, Some(error)) => swrite!(out, ": {}", first_line(error)),
                (Some(counts), None) => {
                    swrite!(out, ": {} of {} failed", counts.failed, counts.tests)
                }
                (None, None) => {}
            }
            if test.attempts > 1 {
                swrite!(out, " (after retry)");
            }
            out.push('\n');
        }
    }

    let flaky: Vec<_> = summary
        .tests
        .iter()
        .filter(|t| t.success && t.attempts > 1)
        .collect();
    if !flaky.is_empty() {
        out.push('\n');
        swriteln!(out, "## Passed on retry");
        out.push('\n');
        for test in &flaky {
            swriteln!(out, "- `{}`", test.identifier);
        }
        out.push('\n');
        swriteln!(
            out,
            "{} {} {} flaky.",
            flaky.len(),
            plural::test_files_str(flaky.len()),
            plural::were_plural_if(flaky.len()),
        );
    }

    out
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}
