// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line driver for the extension test harness.
//!
//! The `harness` binary discovers test files, runs them through the configured command with
//! bounded parallelism and a single retry for failures, archives the reports, and prints a JSON
//! summary to stdout. It exits with 0 if every test file passed and 1 otherwise.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputWriter, StderrStyles};
