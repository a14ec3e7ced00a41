//! Helpers for finder functions.

use crate::error::{AwsformError, NotFoundError, Result};

/// Returns the only element of `values`.
///
/// # Errors
///
/// Returns [`AwsformError::NotFound`] for an empty result and
/// [`AwsformError::TooManyResults`] for more than one element.
pub fn assert_single_value<T>(mut values: Vec<T>) -> Result<T> {
    match values.len() {
        0 => Err(AwsformError::NotFound(NotFoundError::with_message("empty result"))),
        1 => values
            .pop()
            .ok_or_else(|| AwsformError::internal("single value vanished")),
        count => Err(AwsformError::TooManyResults { count }),
    }
}
