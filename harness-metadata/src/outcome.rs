// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, ops::AddAssign};

/// An opaque identifier for a single test unit, typically a test file path relative to the
/// discovery root.
///
/// Identifiers are unique within a run. Reports are sorted by identifier.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(SmolStr);

impl TestId {
    /// Creates a new `TestId`.
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TestId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Per-file test counts reported by the test process.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "proptest1", derive(test_strategy::Arbitrary))]
pub struct TestCounts {
    /// The number of tests in the file.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub tests: u64,

    /// The number of tests that passed.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub passed: u64,

    /// The number of tests that failed.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub failed: u64,

    /// The number of tests that were skipped or left pending.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub skipped: u64,

    /// The number of tests the test process flagged as slow.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub slow: u64,

    /// The number of assertions that were evaluated.
    #[cfg_attr(feature = "proptest1", strategy(0..10_000u64))]
    pub assertions: u64,
}

/// Saturating: counts come from untrusted test output.
impl AddAssign for TestCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.tests = self.tests.saturating_add(rhs.tests);
        self.passed = self.passed.saturating_add(rhs.passed);
        self.failed = self.failed.saturating_add(rhs.failed);
        self.skipped = self.skipped.saturating_add(rhs.skipped);
        self.slow = self.slow.saturating_add(rhs.slow);
        self.assertions = self.assertions.saturating_add(rhs.assertions);
    }
}

/// Whether the output of a test process could be decoded.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all_fields = "camelCase")]
pub enum OutcomeStatus {
    /// The process ran and produced a structured JSON document.
    Decoded {
        /// Counts extracted from the document.
        counts: TestCounts,

        /// The duration the test process reported, in milliseconds.
        duration_ms: u64,
    },

    /// The process exited, but its output could not be parsed. Also produced when the process was
    /// killed after timing out.
    Undecodable {
        /// Why decoding failed.
        error_message: String,

        /// A bounded prefix of the process's standard output.
        stdout_excerpt: String,

        /// A bounded prefix of the process's standard error.
        stderr_excerpt: String,
    },
}

/// The result of a single execution attempt of a test file.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    /// The test this attempt ran.
    pub identifier: TestId,

    /// The attempt number, starting at 1.
    pub attempt: u32,

    /// Whether the output could be decoded, and what it contained.
    #[serde(flatten)]
    pub status: OutcomeStatus,

    /// External files (reports, diagnostics, logs) produced by the test process, passed through
    /// unmodified.
    #[serde(default)]
    pub artifact_refs: Vec<String>,

    /// The exit code of the test process, if it exited normally.
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl TestOutcome {
    /// Returns true if this attempt counts as passing: decoded, with no failed tests.
    pub fn is_passing(&self) -> bool {
        match &self.status {
            OutcomeStatus::Decoded { counts, .. } => counts.failed == 0,
            OutcomeStatus::Undecodable { .. } => false,
        }
    }

    /// Returns the counts for this attempt, if it was decoded.
    pub fn counts(&self) -> Option<&TestCounts> {
        match &self.status {
            OutcomeStatus::Decoded { counts, .. } => Some(counts),
            OutcomeStatus::Undecodable { .. } => None,
        }
    }

    /// Returns the reported duration in milliseconds, if this attempt was decoded.
    pub fn duration_ms(&self) -> Option<u64> {
        match &self.status {
            OutcomeStatus::Decoded { duration_ms, .. } => Some(*duration_ms),
            OutcomeStatus::Undecodable { .. } => None,
        }
    }

    /// Returns the decode error message, if this attempt was undecodable.
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Decoded { .. } => None,
            OutcomeStatus::Undecodable { error_message, .. } => Some(error_message),
        }
    }

    /// Returns this outcome with its attempt number replaced.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}
