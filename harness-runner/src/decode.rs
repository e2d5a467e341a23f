// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding the output of a test process into a [`TestOutcome`].
//!
//! Test processes print a JSON document with their counts, but the document is surrounded by
//! whatever the browser, the extension loader and the test framework print on startup and
//! shutdown. None of that can be silenced at the source, so the decoder takes the text between
//! the first `{` and the last `}` of a stream and parses only that.

use crate::helpers::excerpt;
use harness_metadata::{OutcomeStatus, TestCounts, TestId, TestOutcome};
use serde::Deserialize;
use thiserror::Error;

/// Undecodable outcomes keep at most this many characters of each output stream.
pub const OUTPUT_EXCERPT_CHARS: usize = 1000;

/// Decodes the captured output of one test process.
///
/// Standard output is tried first, then standard error. The returned outcome is always attempt 1;
/// the scheduler restamps the attempt number.
///
/// This is a pure function: decoding the same inputs twice produces identical outcomes.
pub fn decode(
    identifier: TestId,
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
) -> TestOutcome {
    let decoded = decode_stream(stdout).or_else(|stdout_error| {
        decode_stream(stderr).map_err(|stderr_error| (stdout_error, stderr_error))
    });

    let (status, artifact_refs) = match decoded {
        Ok(report) => report.into_status_and_artifacts(),
        Err((stdout_error, stderr_error)) => (
            OutcomeStatus::Undecodable {
                error_message: format!("stdout: {stdout_error}; stderr: {stderr_error}"),
                stdout_excerpt: excerpt(stdout, OUTPUT_EXCERPT_CHARS),
                stderr_excerpt: excerpt(stderr, OUTPUT_EXCERPT_CHARS),
            },
            Vec::new(),
        ),
    };

    TestOutcome {
        identifier,
        attempt: 1,
        status,
        artifact_refs,
        exit_code,
    }
}

fn decode_stream(text: &str) -> Result<RawReport, DecodeError> {
    let start = text.find('{').ok_or(DecodeError::NoJsonObject)?;
    let end = text.rfind('}').ok_or(DecodeError::NoJsonObject)?;
    if end < start {
        return Err(DecodeError::NoJsonObject);
    }

    serde_json::from_str(&text[start..=end]).map_err(DecodeError::Malformed)
}

#[derive(Debug, Error)]
enum DecodeError {
    #[error("no JSON object found in output")]
    NoJsonObject,

    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// The document printed by a test process.
///
/// Every numeric field defaults to 0. Jest's `--json` field names are accepted as aliases.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default, alias = "numTotalTests")]
    tests: u64,
    #[serde(default, alias = "numPassedTests")]
    passed: u64,
    #[serde(default, alias = "numFailedTests")]
    failed: u64,
    #[serde(default, alias = "numPendingTests")]
    skipped: u64,
    #[serde(default)]
    slow: u64,
    #[serde(default)]
    assertions: u64,
    // Milliseconds. Some reporters emit fractional values.
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    report_file: Option<String>,
    #[serde(default)]
    diagnostics_file: Option<String>,
    #[serde(default)]
    log_file: Option<String>,
    #[serde(default)]
    artifacts: Vec<String>,
}

impl RawReport {
    fn into_status_and_artifacts(self) -> (OutcomeStatus, Vec<String>) {
        let counts = TestCounts {
            tests: self.tests,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
            slow: self.slow,
            assertions: self.assertions,
        };
        // f64 -> u64 casts saturate, and NaN maps to 0.
        let duration_ms = self.duration.max(0.0).round() as u64;

        let artifact_refs = [self.report_file, self.diagnostics_file, self.log_file]
            .into_iter()
            .flatten()
            .chain(self.artifacts)
            .collect();

        (
            OutcomeStatus::Decoded {
                counts,
                duration_ms,
            },
            artifact_refs,
        )
    }
}
