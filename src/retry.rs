//! Bounded retries with exponential backoff.
//!
//! Patch application, package installs and structured oracle calls all go
//! through `with_retry` instead of re-invoking themselves.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for the doubled delay.
    pub max_delay: Duration,
    /// Whether to add up to 250ms of random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Same backoff, different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Errors that may be worth another attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Outcome of a retried operation that ran out of attempts.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempt budget is spent.
///
/// The closure receives the 1-based attempt number. A non-retryable error
/// is returned after the attempt that produced it, so `attempts` is always
/// the number of times `operation` actually ran.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let mut wait = policy.delay_for(attempt);
                if policy.jitter {
                    wait += Duration::from_millis(rand::thread_rng().gen_range(0..250));
                }

                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "Retrying after error: {}",
                    e
                );

                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last: e,
                });
            }
        }
    }
}
