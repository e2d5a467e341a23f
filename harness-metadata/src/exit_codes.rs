// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `harness` failures.
///
/// CI pipelines driving the extension suite only distinguish between success and failure, so every
/// failure class maps to 1. The constants exist so that call sites name the reason they are
/// exiting.
pub enum HarnessExitCode {}

impl HarnessExitCode {
    /// No errors occurred and every test file passed, possibly after a retry.
    pub const OK: i32 = 0;

    /// One or more test files failed on their final attempt.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// No test files were discovered and the no-tests behavior is `fail`.
    pub const NO_TESTS_RUN: i32 = 1;

    /// A user issue happened while setting up a harness invocation (bad config, unknown profile).
    pub const SETUP_ERROR: i32 = 1;

    /// The harness itself broke: a test process could not be spawned, or reports could not be
    /// written.
    pub const INFRASTRUCTURE_ERROR: i32 = 1;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 1;
}
