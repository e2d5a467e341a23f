// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a single attempt of a single test file.
//!
//! The runner treats executing a test as a black box: it hands an identifier and an attempt number
//! to a [`TestExecutor`] and awaits a [`TestOutcome`]. [`ProcessExecutor`] is the implementation
//! used by the `harness` binary.

mod process;

pub use process::*;

use crate::errors::ExecuteError;
use harness_metadata::{TestId, TestOutcome};
use std::fmt;

/// Runs one attempt of one test file.
///
/// Implementations must give every attempt its own isolated resources (debug port, working
/// directory), since attempts run concurrently. They must also bound how long an attempt can take:
/// the runner itself never times out.
pub trait TestExecutor: fmt::Debug + Send + Sync {
    /// Runs `id` and returns its outcome, stamped with `attempt`.
    ///
    /// A test that fails, hangs or prints garbage is an outcome, not an error. `Err` is reserved
    /// for failures of the harness itself (for example, the test command could not be spawned) and
    /// aborts the whole run.
    fn execute(
        &self,
        id: TestId,
        attempt: u32,
    ) -> impl Future<Output = Result<TestOutcome, ExecuteError>> + Send;
}
