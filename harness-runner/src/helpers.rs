// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for harness-runner.

use std::time::Duration;

/// Utilities for pluralizing various words based on count.
pub mod plural {
    /// Returns "test file" if `count` is 1, otherwise "test files".
    pub fn test_files_str(count: usize) -> &'static str {
        if count == 1 { "test file" } else { "test files" }
    }

    /// Returns "was" if `count` is 1, otherwise "were".
    pub fn were_plural_if(count: usize) -> &'static str {
        if count == 1 { "was" } else { "were" }
    }
}

/// Returns at most the first `max_chars` characters of `s`, cut on a character boundary.
pub(crate) fn excerpt(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_owned(),
        None => s.to_owned(),
    }
}

/// Formats a duration as seconds with three decimal places, e.g. `1.250s`.
pub(crate) struct DisplayDurationSecs(pub(crate) Duration);

impl std::fmt::Display for DisplayDurationSecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}
