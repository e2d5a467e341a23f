// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::schedule;
use harness_metadata::{TestId, TestOutcome};
use std::{collections::HashMap, num::NonZeroUsize};
use tracing::debug;

/// Every attempt made for a single test file: one, or two if the first attempt failed and retries
/// are enabled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunResult {
    identifier: TestId,
    first: TestOutcome,
    retry: Option<TestOutcome>,
}

impl RunResult {
    /// Creates a result for a test file that was run once.
    pub fn single(first: TestOutcome) -> Self {
        Self {
            identifier: first.identifier.clone(),
            first,
            retry: None,
        }
    }

    /// Creates a result for a test file that was retried.
    pub fn retried(first: TestOutcome, retry: TestOutcome) -> Self {
        debug_assert_eq!(first.identifier, retry.identifier);
        Self {
            identifier: first.identifier.clone(),
            first,
            retry: Some(retry),
        }
    }

    /// Returns the test file.
    pub fn identifier(&self) -> &TestId {
        &self.identifier
    }

    /// Returns every attempt, in order.
    pub fn attempts(&self) -> impl Iterator<Item = &TestOutcome> + Clone {
        std::iter::once(&self.first).chain(&self.retry)
    }

    /// Returns the number of attempts made.
    pub fn attempt_count(&self) -> usize {
        1 + usize::from(self.retry.is_some())
    }

    /// Returns true if the test file was run a second time.
    pub fn was_retried(&self) -> bool {
        self.retry.is_some()
    }

    /// Returns the outcome that counts for this test file.
    ///
    /// A passing retry overrides the first attempt. A failing retry doesn't: the first attempt is
    /// reported, and the retry remains in [`attempts`](Self::attempts).
    pub fn final_outcome(&self) -> &TestOutcome {
        match &self.retry {
            Some(retry) if retry.is_passing() => retry,
            _ => &self.first,
        }
    }

    /// Returns the most recent attempt.
    pub fn last_attempt(&self) -> &TestOutcome {
        self.retry.as_ref().unwrap_or(&self.first)
    }

    /// Returns true if the final outcome passed.
    pub fn is_success(&self) -> bool {
        self.final_outcome().is_passing()
    }

    /// Consumes self, returning every attempt in order.
    pub fn into_attempts(self) -> Vec<TestOutcome> {
        std::iter::once(self.first).chain(self.retry).collect()
    }
}

/// Runs every failing outcome in `first_pass` a second time, then pairs up the attempts.
///
/// Passing outcomes are never re-run, and nothing is run more than twice. The second pass goes
/// through [`schedule`] with the same limit, so a retry starts only after its first attempt has
/// finished. An `Err` from `run_one` aborts the retry pass and is returned.
///
/// Results are returned in the order of `first_pass`.
pub async fn retry_failures<F, Fut, E>(
    first_pass: Vec<TestOutcome>,
    limit: NonZeroUsize,
    run_one: F,
) -> Result<Vec<RunResult>, E>
where
    F: FnMut(TestId, u32) -> Fut,
    Fut: Future<Output = Result<TestOutcome, E>>,
{
    let failing: Vec<_> = first_pass
        .iter()
        .filter(|outcome| !outcome.is_passing())
        .map(|outcome| outcome.identifier.clone())
        .collect();

    if failing.is_empty() {
        return Ok(first_pass.into_iter().map(RunResult::single).collect());
    }

    debug!(count = failing.len(), "retrying failed test files");
    let mut retries: HashMap<_, _> = schedule(failing, limit, 2, run_one)
        .await?
        .into_iter()
        .map(|outcome| (outcome.identifier.clone(), outcome))
        .collect();

    Ok(first_pass
        .into_iter()
        .map(|first| match retries.remove(&first.identifier) {
            Some(retry) => RunResult::retried(first, retry),
            None => RunResult::single(first),
        })
        .collect())
}
