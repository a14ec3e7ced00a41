//! Bounded retry of a single fallible call.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};

use super::state::Backoff;
use crate::error::{AwsformError, Result, TimeoutError};

/// Default lower bound of the wait between attempts.
pub const DEFAULT_MIN_POLL: Duration = Duration::from_millis(500);

/// Outcome of one failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// The call may succeed if repeated.
    Retryable(AwsformError),
    /// The call failed for good.
    NonRetryable(AwsformError),
}

impl AttemptError {
    /// Returns the wrapped error.
    #[must_use]
    pub fn into_inner(self) -> AwsformError {
        match self {
            Self::Retryable(err) | Self::NonRetryable(err) => err,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable(err) => write!(f, "retryable: {err}"),
            Self::NonRetryable(err) => write!(f, "{err}"),
        }
    }
}

/// Tuning of the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Sleep before the first attempt.
    pub delay: Duration,
    /// Lower bound of the wait between attempts.
    pub min_poll: Duration,
    /// Fixed wait between attempts, overriding the backoff when non-zero.
    pub poll_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            min_poll: DEFAULT_MIN_POLL,
            poll_interval: Duration::ZERO,
        }
    }
}

impl RetryOptions {
    /// Sets the initial delay.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the minimum wait between attempts.
    #[must_use]
    pub const fn with_min_poll(mut self, min_poll: Duration) -> Self {
        self.min_poll = min_poll;
        self
    }

    /// Sets a fixed wait between attempts.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Calls `f` until it succeeds, fails for good, or `timeout` elapses.
///
/// # Errors
///
/// Returns the first non-retryable error. At the deadline, returns the last
/// retryable error, or a [`TimeoutError`] without a last error when no
/// attempt completed.
pub async fn retry<T, F, Fut>(timeout: Duration, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    retry_with(timeout, RetryOptions::default(), f).await
}

/// Same as [`retry`] with explicit tuning.
///
/// # Errors
///
/// See [`retry`].
pub async fn retry_with<T, F, Fut>(timeout: Duration, options: RetryOptions, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let deadline = Instant::now() + timeout;
    let mut last_error: Option<AwsformError> = None;
    let mut attempts: u32 = 0;

    let outcome = timeout_at(deadline, async {
        let mut backoff = Backoff::new(options.min_poll, options.poll_interval);

        if !options.delay.is_zero() {
            sleep(options.delay).await;
        }

        loop {
            attempts += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::NonRetryable(err)) => return Err(err),
                Err(AttemptError::Retryable(err)) => {
                    debug!("Attempt {attempts} failed, retrying: {err}");
                    last_error = Some(err);
                }
            }

            sleep(backoff.next(true)).await;
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "Retry gave up after {} ({attempts} attempts)",
                humantime::format_duration(timeout)
            );
            Err(last_error.unwrap_or_else(|| {
                AwsformError::Timeout(TimeoutError {
                    last_error: None,
                    last_state: String::new(),
                    timeout,
                    expected_state: vec![String::from("success")],
                })
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsApiError;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_retryable_errors() {
        let mut calls = 0;

        let result = retry(Duration::from_secs(60), || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(AttemptError::Retryable(AwsformError::internal("not yet")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let mut calls = 0;

        let result: Result<()> = retry(Duration::from_secs(60), || {
            calls += 1;
            async {
                Err(AttemptError::NonRetryable(AwsformError::Aws(AwsApiError::new(
                    "AccessDenied",
                    "denied",
                ))))
            }
        })
        .await;

        assert!(result.is_err_and(|e| e.aws_code_equals(&["AccessDenied"])));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_last_retryable_error() {
        let result: Result<()> = retry(Duration::from_secs(5), || async {
            Err(AttemptError::Retryable(AwsformError::Aws(AwsApiError::new(
                "OperationAborted",
                "conflicting operation",
            ))))
        })
        .await;

        let err = result.err();
        assert!(err.as_ref().is_some_and(|e| e.aws_code_equals(&["OperationAborted"])));
        assert!(!err.is_some_and(|e| e.is_resource_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_without_completed_attempt_is_resource_timeout() {
        let result: Result<()> = retry(Duration::from_secs(5), || async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        assert!(result.is_err_and(|e| e.is_resource_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minimum_poll_between_attempts() {
        let start = Instant::now();
        let mut calls = 0;

        let _ = retry(Duration::from_secs(60), || {
            calls += 1;
            let n = calls;
            async move {
                if n < 2 {
                    Err(AttemptError::Retryable(AwsformError::internal("again")))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(start.elapsed() >= DEFAULT_MIN_POLL);
    }
}
