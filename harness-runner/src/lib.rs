// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for the extension test harness.
//!
//! A run goes through these stages:
//!
//! 1. [`discovery`] finds the test files to run.
//! 2. The [`runner`] schedules one attempt per test file on an [`executor`], with a bounded number
//!    in flight, then retries every failure exactly once.
//! 3. Each attempt's output is turned into an outcome by [`decode`].
//! 4. The [`reporter`] aggregates the results and persists the report documents.

pub mod config;
pub mod decode;
pub mod discovery;
pub mod errors;
pub mod executor;
mod helpers;
pub mod reporter;
pub mod runner;
mod time;
