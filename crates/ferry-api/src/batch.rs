//! Windowed batch execution of remote writes.
//!
//! At most `limit` operations are in flight at once. A permission failure
//! skips its item; any other failure stops dispatch, raises the batch's
//! [`AbortSignal`], lets requests that were already sent finish, and returns
//! a [`BatchAbort`] carrying everything that did complete.
//!
//! An operation counts as in flight from dispatch, which may be long before
//! its request is sent when the tool's throttle is busy. Operations wait on
//! the throttle with [`AbortSignal::aborted`] alongside, and give up with
//! [`ApiError::Aborted`] instead of sending once the batch has failed.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{ApiError, FetchError};

/// Distinguishes failures that skip one item from failures that abort the batch.
pub trait FailureClass {
    fn is_permission_denied(&self) -> bool;

    /// The operation gave up before doing anything remote.
    fn is_aborted(&self) -> bool {
        false
    }
}

impl FailureClass for ApiError {
    fn is_permission_denied(&self) -> bool {
        ApiError::is_permission_denied(self)
    }

    fn is_aborted(&self) -> bool {
        ApiError::is_aborted(self)
    }
}

impl FailureClass for FetchError {
    fn is_permission_denied(&self) -> bool {
        self.api_error().is_permission_denied()
    }

    fn is_aborted(&self) -> bool {
        self.api_error().is_aborted()
    }
}

/// Raised once a batch has failed.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that is never raised, for requests outside a batch.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Receivers keep the last value after the sender is gone.
        drop(tx);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the batch aborts; pends forever if it finishes cleanly.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Emitted once per finished item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemProgress {
    Completed { index: usize },
    Skipped { index: usize },
}

/// A successful item and its position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed<T> {
    pub index: usize,
    pub value: T,
}

/// A failed item and its position in the input.
#[derive(Debug)]
pub struct ItemFailure<E> {
    pub index: usize,
    pub cause: E,
}

/// Result of a batch that ran to the end.
#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    /// Successes in input order.
    pub completed: Vec<Completed<T>>,
    /// Items skipped for lack of permission, in input order.
    pub skipped: Vec<ItemFailure<E>>,
}

impl<T, E> Default for BatchOutcome<T, E> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T, E> BatchOutcome<T, E> {
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.completed.iter().map(|c| &c.value)
    }
}

/// A batch stopped by a failure other than a permission denial.
#[derive(Debug)]
pub struct BatchAbort<T, E> {
    /// The first aborting failure.
    pub failure: ItemFailure<E>,
    /// Aborting failures among operations that were already in flight.
    pub concurrent_failures: Vec<ItemFailure<E>>,
    /// Successes, in input order, including in-flight items that finished
    /// after the abort.
    pub completed: Vec<Completed<T>>,
    pub skipped: Vec<ItemFailure<E>>,
    /// Indices whose request was never sent.
    pub not_attempted: Vec<usize>,
}

impl<T, E: fmt::Display> fmt::Display for BatchAbort<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch aborted at item {}: {} ({} completed, {} not attempted)",
            self.failure.index,
            self.failure.cause,
            self.completed.len(),
            self.not_attempted.len()
        )
    }
}

impl<T: fmt::Debug, E: StdError + 'static> StdError for BatchAbort<T, E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.failure.cause)
    }
}

/// Apply `operation` to every item with at most `limit` calls in flight.
///
/// Each call gets the batch's [`AbortSignal`]. `on_progress` fires once per
/// completed or skipped item. An empty input returns immediately without
/// calling either closure.
pub async fn run_batch<I, T, E, F, Fut, P>(
    items: Vec<I>,
    limit: usize,
    mut operation: F,
    mut on_progress: P,
) -> Result<BatchOutcome<T, E>, BatchAbort<T, E>>
where
    F: FnMut(I, AbortSignal) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: FailureClass + fmt::Display,
    P: FnMut(ItemProgress),
{
    let mut outcome = BatchOutcome::default();
    if items.is_empty() {
        return Ok(outcome);
    }

    let total = items.len();
    let limit = limit.max(1);
    let (abort_tx, abort_rx) = watch::channel(false);
    let signal = AbortSignal { rx: abort_rx };
    let mut queue = items.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut failures: Vec<ItemFailure<E>> = Vec::new();
    let mut not_attempted = Vec::new();

    loop {
        while failures.is_empty() && in_flight.len() < limit {
            let Some((index, item)) = queue.next() else {
                break;
            };
            let call = operation(item, signal.clone());
            in_flight.push(async move { (index, call.await) });
        }

        let Some((index, result)) = in_flight.next().await else {
            break;
        };

        match result {
            Ok(value) => {
                on_progress(ItemProgress::Completed { index });
                outcome.completed.push(Completed { index, value });
            }
            Err(cause) if cause.is_aborted() => not_attempted.push(index),
            Err(cause) if cause.is_permission_denied() => {
                debug!(index, error = %cause, "item skipped: permission denied");
                on_progress(ItemProgress::Skipped { index });
                outcome.skipped.push(ItemFailure { index, cause });
            }
            Err(cause) => {
                warn!(index, total, error = %cause, "batch item failed, aborting batch");
                abort_tx.send_replace(true);
                failures.push(ItemFailure { index, cause });
            }
        }
    }

    outcome.completed.sort_by_key(|c| c.index);
    outcome.skipped.sort_by_key(|s| s.index);

    if failures.is_empty() {
        return Ok(outcome);
    }

    failures.sort_by_key(|f| f.index);
    let mut failures = failures.into_iter();
    let Some(failure) = failures.next() else {
        return Ok(outcome);
    };

    not_attempted.extend(queue.map(|(index, _)| index));
    not_attempted.sort_unstable();

    Err(BatchAbort {
        failure,
        concurrent_failures: failures.collect(),
        completed: outcome.completed,
        skipped: outcome.skipped,
        not_attempted,
    })
}
