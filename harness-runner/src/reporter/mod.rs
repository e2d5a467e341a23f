// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning run results into reports.
//!
//! [`aggregate`] computes statistics and the summary, report and diagnostics documents from the
//! results of a run. [`ReportSink`] persists them, and [`render_markdown`] produces the optional
//! Markdown summary.

mod aggregator;
mod markdown;
mod sink;

pub use aggregator::*;
pub use markdown::*;
pub use sink::*;
