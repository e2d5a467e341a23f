// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for the extension test harness.
//!
//! The `harness run` command prints a [`ConciseSummary`] to stdout once the run is complete, and
//! archives a [`VerboseReport`] and [`RunDiagnostics`] under the reports directory. This crate
//! contains the serializable forms of those documents so that CI glue and other tooling can read
//! them back.
//!
//! All documents use camelCase keys.

mod exit_codes;
mod outcome;
mod summary;

pub use exit_codes::*;
pub use outcome::*;
pub use summary::*;
