//! Eventual-consistency retry and state-wait machinery.
//!
//! This module provides:
//! - [`StateChangeConf`], a poller driven by a refresh function
//! - [`retry`] and [`retry_with`], bounded retries of a single call
//! - Condition helpers that retry on specific errors and make one fallback
//!   attempt when the loop times out before any attempt finishes

mod attempt;
mod conditions;
mod find;
mod state;

pub use attempt::{AttemptError, DEFAULT_MIN_POLL, RetryOptions, retry, retry_with};
pub use conditions::{
    retry_until_not_found, retry_when, retry_when_aws_err_code_equals,
    retry_when_aws_err_message_contains, retry_when_new_resource_not_found, retry_when_not_found,
    set_last_error, timed_out,
};
pub use find::assert_single_value;
pub use state::{DEFAULT_NOT_FOUND_CHECKS, MAX_BACKOFF, StateChangeConf};
