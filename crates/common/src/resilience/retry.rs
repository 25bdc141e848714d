//! Retry strategy with exponential backoff and pluggable retry conditions
//!
//! Operations that may fail transiently (provider token refresh, for example)
//! run through a [`RetryExecutor`]. A [`RetryPolicy`] decides per error
//! whether another attempt is worthwhile; the executor returns the last error
//! unchanged once attempts are exhausted or the policy says stop.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Decision returned by a [`RetryPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Stop,
}

/// Decides whether a failed attempt should be retried
pub trait RetryPolicy<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Retry configuration
///
/// Delays grow as `initial_delay * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(2), Duration::from_secs(10))
    }
}

impl RetryConfig {
    /// Exponential backoff with base 2 starting at `initial_delay`
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts, initial_delay, max_delay }
    }

    /// Delay after the given zero-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Executes async operations under a [`RetryConfig`] and [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, the policy stops, or attempts run
    /// out. The error of the final attempt is returned as-is.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            debug!(attempt = attempt + 1, max_attempts, "Executing operation");

            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt + 1 >= max_attempts {
                        warn!(attempts = attempt + 1, error = %error, "All retry attempts exhausted");
                        return Err(error);
                    }

                    if self.policy.should_retry(&error, attempt) == RetryDecision::Stop {
                        debug!(error = %error, "Retry policy determined not to retry");
                        return Err(error);
                    }

                    let delay = self.config.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Common retry policies
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Retry while a predicate over the error holds
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<E, F> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for resilience::retry.
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::policies::PredicateRetry;
    use super::*;

    fn retry_all() -> PredicateRetry<fn(&String) -> bool> {
        PredicateRetry::new(|_| true)
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_secs(2));
        assert_eq!(config.delay_for(1), Duration::from_secs(4));
        assert_eq!(config.delay_for(2), Duration::from_secs(8));
        assert_eq!(config.delay_for(3), Duration::from_secs(10));
        assert_eq!(config.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = RetryConfig { max_attempts: 0, ..RetryConfig::default() };
        let executor = RetryExecutor::new(config, retry_all());

        let counter = Arc::clone(&calls);
        let result: Result<(), String> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("network down".to_string())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates `RetryExecutor::execute` behavior for the transient failure
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the operation succeeds on the third attempt.
    /// - Confirms virtual time advanced by the two backoff delays (2s + 4s).
    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryConfig::default(), retry_all());
        let start = tokio::time::Instant::now();

        let counter = Arc::clone(&calls);
        let result: Result<&str, String> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection reset".to_string())
                    } else {
                        Ok("token")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "token");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_non_retryable_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = PredicateRetry::new(|e: &String| e.starts_with("network"));
        let executor = RetryExecutor::new(RetryConfig::default(), policy);

        let counter = Arc::clone(&calls);
        let result: Result<(), String> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("invalid_grant".to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "invalid_grant");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(RetryConfig::default(), retry_all());

        let counter = Arc::clone(&calls);
        let result: Result<(), String> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(format!("network failure {n}"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "network failure 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
