// Copyright (c) The harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use future_queue::{FutureQueueContext, StreamExt};
use futures::prelude::*;
use harness_metadata::{TestId, TestOutcome};
use std::num::NonZeroUsize;
use tracing::debug;

/// Runs `run_one` over every identifier with at most `limit` attempts in flight.
///
/// Identifiers are dispatched in input order. As soon as an attempt finishes, the next pending
/// identifier is dispatched, so the pool never idles below `min(limit, remaining)` while work
/// remains. Outcomes are returned in completion order, each stamped with `attempt`.
///
/// `run_one` records test failures as data. An `Err` from it is an infrastructure failure: the
/// remaining attempts are dropped and the error is returned.
pub async fn schedule<F, Fut, E>(
    ids: Vec<TestId>,
    limit: NonZeroUsize,
    attempt: u32,
    mut run_one: F,
) -> Result<Vec<TestOutcome>, E>
where
    F: FnMut(TestId, u32) -> Fut,
    Fut: Future<Output = Result<TestOutcome, E>>,
{
    let total = ids.len();
    debug!(total, limit = limit.get(), attempt, "scheduling test files");

    // Every attempt has weight 1, so future_queue keeps exactly `limit` of them in flight.
    stream::iter(ids)
        .map(move |id| {
            debug!(%id, attempt, "dispatching");
            let fut = run_one(id, attempt);
            (1, move |_cx: FutureQueueContext| fut)
        })
        .future_queue(limit.get())
        .map_ok(move |outcome| outcome.with_attempt(attempt))
        .try_collect()
        .await
}
