//! Provider retry policy with exponential backoff

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, SummaryError};

/// Which failures a backend considers worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Rate limits, timeouts, server and generic API errors
    TransientErrors,
    /// Every error from the provider call
    AnyError,
}

/// Backend-specific retry policy
///
/// The wait before attempt `n + 1` is `multiplier * 2^(n - 1)` seconds,
/// clamped to `[min_wait, max_wait]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_wait: Duration,
    pub max_wait: Duration,
    pub retry_on: RetryOn,
}

impl RetryPolicy {
    /// 3 attempts on transient errors, waits between 4s and 10s
    pub fn standard() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 1.0,
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
            retry_on: RetryOn::TransientErrors,
        }
    }

    /// 2 attempts on any error
    pub fn broad() -> Self {
        Self {
            max_attempts: 2,
            retry_on: RetryOn::AnyError,
            ..Self::standard()
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::standard()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_waits(mut self, min_wait: Duration, max_wait: Duration) -> Self {
        self.min_wait = min_wait;
        self.max_wait = max_wait.max(min_wait);
        self
    }

    pub fn should_retry(&self, error: &SummaryError) -> bool {
        match self.retry_on {
            RetryOn::TransientErrors => error.is_transient(),
            RetryOn::AnyError => true,
        }
    }

    /// Wait after `attempt` failed attempts (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let raw = Duration::try_from_secs_f64(secs).unwrap_or(self.max_wait);
        raw.max(self.min_wait).min(self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Execute an async operation under `policy`, returning the last error once
/// attempts are exhausted
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if policy.should_retry(&e) && attempts < policy.max_attempts => {
                let delay = policy.delay_for(attempts);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name, attempts, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
