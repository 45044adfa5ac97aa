//! Deadline enforcement for action attempts

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// A state's action exceeded its `timeout_seconds`
///
/// Never surfaced to callers: the executor turns it into the `timeout` event.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("action timed out after {limit:?}")]
pub struct TimeoutError {
    pub limit: Duration,
}

/// Race `future` against a timer when a limit is set
///
/// Whichever finishes first wins; the loser is dropped, which cancels it.
pub async fn with_deadline<F>(limit: Option<Duration>, future: F) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| TimeoutError { limit }),
        None => Ok(future.await),
    }
}
