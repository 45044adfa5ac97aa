//! Retry policy for state actions

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Upper bound on `max_attempts` accepted at registration
pub const MAX_RETRY_ATTEMPTS: u32 = 100;

/// Longest delay ever slept between attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Retry configuration declared on a state
///
/// Serialized in definition files as:
///
/// ```json
/// { "max_attempts": 3, "backoff_seconds": 2, "backoff_coefficient": 2.0 }
/// ```
///
/// # Example
///
/// ```
/// use streamflow_workflow::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::fixed(Duration::from_secs(1), 3);
///
/// // No delay before the first attempt, one second before each retry
/// assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial one)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in seconds
    #[serde(default)]
    pub backoff_seconds: f64,

    /// Multiplier applied to the delay after each retry (1.0 = fixed)
    #[serde(default = "default_coefficient")]
    pub backoff_coefficient: f64,

    /// Cap on the delay between retries, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_backoff_seconds: Option<f64>,

    /// Jitter factor (0.0-1.0)
    ///
    /// A value of 0.1 means ±10% randomness.
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_coefficient() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    /// A single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_seconds: 0.0,
            backoff_coefficient: 1.0,
            max_backoff_seconds: None,
            jitter: 0.0,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_seconds: interval.as_secs_f64(),
            ..Self::no_retry()
        }
    }

    /// Doubling delay starting at `initial`
    pub fn exponential(initial: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_seconds: initial.as_secs_f64(),
            backoff_coefficient: 2.0,
            ..Self::no_retry()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff_seconds = Some(max.as_secs_f64());
        self
    }

    /// Set the jitter factor (clamped to 0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Whether more than one attempt is allowed
    pub fn retries(&self) -> bool {
        self.max_attempts > 1
    }

    /// Calculate delay before a given attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.backoff_seconds <= 0.0 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 1;
        let base = self.backoff_seconds * self.backoff_coefficient.powi(retry_num as i32 - 1);
        let capped = match self.max_backoff_seconds {
            Some(max) => base.min(max),
            None => base,
        }
        .min(MAX_RETRY_DELAY.as_secs_f64());

        let jittered = if self.jitter > 0.0 && capped > 0.0 {
            let mut rng = rand::thread_rng();
            let jitter_range = capped * self.jitter;
            let jitter_offset = rng.gen_range(-jitter_range..jitter_range);
            (capped + jitter_offset).max(0.0)
        } else {
            capped
        };

        // Overflowing growth saturates instead of wrapping to zero
        Duration::try_from_secs_f64(jittered)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Describe why the policy is unusable, if it is
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(format!(
                "max_attempts {} exceeds the limit of {}",
                self.max_attempts, MAX_RETRY_ATTEMPTS
            ));
        }
        if Duration::try_from_secs_f64(self.backoff_seconds).is_err() {
            return Err(format!(
                "backoff_seconds must be a non-negative duration, got {}",
                self.backoff_seconds
            ));
        }
        if !self.backoff_coefficient.is_finite() || self.backoff_coefficient < 1.0 {
            return Err("backoff_coefficient must be at least 1.0".to_string());
        }
        if let Some(max) = self.max_backoff_seconds {
            if Duration::try_from_secs_f64(max).is_err() {
                return Err(format!(
                    "max_backoff_seconds must be a non-negative duration, got {max}"
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0".to_string());
        }
        Ok(())
    }
}
