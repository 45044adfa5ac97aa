//! Reliability patterns for state execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Bounded retries with fixed or exponential backoff
//! - [`with_deadline`] - Timer race used for `timeout_seconds`

mod retry;
mod timeout;

pub use retry::{RetryPolicy, MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY};
pub use timeout::{with_deadline, TimeoutError};
