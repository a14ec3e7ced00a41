//! AWS API error capture and classification.
//!
//! Every service error is flattened into an [`AwsApiError`] through the shared
//! [`ProvideErrorMetadata`] trait, so the retry predicates can match on the
//! AWS error code without knowing which operation produced it.

use std::fmt;

use aws_sdk_s3::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};

/// Known AWS error codes for "not found" conditions.
pub const NOT_FOUND_CODES: &[&str] = &[
    "NotFound",
    "NoSuchBucket",
    "InvalidVolume.NotFound",
    "DBInstanceNotFound",
    "DBInstanceNotFoundFault",
    "ResourceNotFoundException",
];

/// Known AWS error codes for throttling.
pub const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "SlowDown",
    "TooManyRequestsException",
];

/// Known AWS error codes for dependency violations (resource still in use).
pub const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "VolumeInUse"];

/// An error returned by an AWS API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsApiError {
    /// AWS error code, e.g. `InvalidVolume.NotFound`.
    pub code: Option<String>,
    /// Error message.
    pub message: String,
    /// Set for transport timeouts and I/O failures.
    pub transient: bool,
}

impl AwsApiError {
    /// Creates an error with a code and a message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            transient: false,
        }
    }

    /// Creates an error that carries no AWS error code.
    #[must_use]
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            transient: false,
        }
    }

    /// Captures an SDK error from any service client.
    #[must_use]
    pub fn from_sdk<E, R>(err: &SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: fmt::Debug,
    {
        let transient = match err {
            SdkError::TimeoutError(_) => true,
            SdkError::DispatchFailure(failure) => failure.is_timeout() || failure.is_io(),
            _ => false,
        };

        let meta = ProvideErrorMetadata::meta(err);
        let message = meta
            .message()
            .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string);

        Self {
            code: meta.code().map(ToString::to_string),
            message,
            transient,
        }
    }

    /// Returns the error code, or an empty string.
    #[must_use]
    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    /// Returns true if the error code equals any of `codes`.
    #[must_use]
    pub fn code_equals(&self, codes: &[&str]) -> bool {
        codes.contains(&self.code())
    }

    /// Returns true if the code equals `code` and the message contains `needle`.
    #[must_use]
    pub fn message_contains(&self, code: &str, needle: &str) -> bool {
        self.code() == code && self.message.contains(needle)
    }

    /// Returns true for well-known "not found" codes.
    #[must_use]
    pub fn is_not_found_code(&self) -> bool {
        self.code_equals(NOT_FOUND_CODES)
    }

    /// Returns true for throttling codes and transient transport failures.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.transient || self.code_equals(THROTTLING_CODES)
    }

    /// Returns true if the resource is still referenced by something else.
    #[must_use]
    pub fn is_dependency_violation(&self) -> bool {
        self.code_equals(DEPENDENCY_CODES)
    }
}

impl fmt::Display for AwsApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for AwsApiError {}

impl From<BuildError> for AwsApiError {
    fn from(err: BuildError) -> Self {
        Self::uncoded(format!("invalid request: {err}"))
    }
}

impl<E, R> From<SdkError<E, R>> for AwsApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        Self::from_sdk(&err)
    }
}

impl From<BuildError> for crate::error::AwsformError {
    fn from(err: BuildError) -> Self {
        Self::Aws(err.into())
    }
}

impl<E, R> From<SdkError<E, R>> for crate::error::AwsformError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    fn from(err: SdkError<E, R>) -> Self {
        Self::Aws(AwsApiError::from_sdk(&err))
    }
}
