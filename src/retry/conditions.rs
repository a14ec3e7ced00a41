//! Retry helpers keyed on error conditions.
//!
//! Each helper wraps [`retry`] and, when the loop ends in a resource timeout
//! (no attempt got to finish), makes exactly one more call.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::attempt::{AttemptError, retry};
use crate::error::{AwsformError, Result};

/// Returns true for a timeout where no attempt finished.
#[must_use]
pub fn timed_out(err: &AwsformError) -> bool {
    err.is_resource_timeout()
}

/// Retries `f` while `predicate` holds for its error.
///
/// # Errors
///
/// Returns the first error rejected by `predicate`, or the last retried error
/// at the deadline.
pub async fn retry_when<T, F, Fut, P>(timeout: Duration, mut f: F, predicate: P) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&AwsformError) -> bool,
{
    let predicate = &predicate;
    let result = retry(timeout, || {
        let attempt = f();
        async move {
            attempt.await.map_err(|err| {
                if predicate(&err) {
                    AttemptError::Retryable(err)
                } else {
                    AttemptError::NonRetryable(err)
                }
            })
        }
    })
    .await;

    match result {
        Err(err) if timed_out(&err) => {
            debug!("Retry timed out before any attempt finished, trying once more");
            f().await
        }
        other => other,
    }
}

/// Retries `f` while it fails with any of the AWS error `codes`.
///
/// # Errors
///
/// See [`retry_when`].
pub async fn retry_when_aws_err_code_equals<T, F, Fut>(
    timeout: Duration,
    f: F,
    codes: &[&str],
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, f, |err| err.aws_code_equals(codes)).await
}

/// Retries `f` while it fails with AWS error `code` and a message containing `needle`.
///
/// # Errors
///
/// See [`retry_when`].
pub async fn retry_when_aws_err_message_contains<T, F, Fut>(
    timeout: Duration,
    f: F,
    code: &str,
    needle: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, f, |err| err.aws_message_contains(code, needle)).await
}

/// Retries `f` while it reports the resource as not found.
///
/// # Errors
///
/// See [`retry_when`].
pub async fn retry_when_not_found<T, F, Fut>(timeout: Duration, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, f, AwsformError::is_not_found).await
}

/// Retries not-found errors only while the resource is being created.
///
/// # Errors
///
/// See [`retry_when`].
pub async fn retry_when_new_resource_not_found<T, F, Fut>(
    timeout: Duration,
    f: F,
    is_new: bool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_when(timeout, f, |err| is_new && err.is_not_found()).await
}

/// Calls `f` until it reports the resource as not found.
///
/// A found resource is retried with [`AwsformError::StillExists`].
///
/// # Errors
///
/// Returns any error other than not-found, or [`AwsformError::StillExists`]
/// when the resource outlives the timeout.
pub async fn retry_until_not_found<T, F, Fut>(timeout: Duration, mut f: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let result = retry(timeout, || {
        let attempt = f();
        async move { gone_or_retry(attempt.await) }
    })
    .await;

    match result {
        Err(err) if timed_out(&err) => gone_or_retry(f().await).map_err(AttemptError::into_inner),
        other => other,
    }
}

fn gone_or_retry<T>(result: Result<T>) -> std::result::Result<(), AttemptError> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(AttemptError::NonRetryable(err)),
        Ok(_) => Err(AttemptError::Retryable(AwsformError::StillExists)),
    }
}

/// Attaches `cause` to a timeout or unexpected-state error that has none.
///
/// Other errors are returned unchanged.
#[must_use]
pub fn set_last_error(err: AwsformError, cause: Option<AwsformError>) -> AwsformError {
    let Some(cause) = cause else {
        return err;
    };

    match err {
        AwsformError::Timeout(mut timeout) if timeout.last_error.is_none() => {
            timeout.last_error = Some(Box::new(cause));
            AwsformError::Timeout(timeout)
        }
        AwsformError::UnexpectedState(mut unexpected) if unexpected.last_error.is_none() => {
            unexpected.last_error = Some(Box::new(cause));
            AwsformError::UnexpectedState(unexpected)
        }
        other => other,
    }
}
