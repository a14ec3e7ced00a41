//! Error types for the awsform resource machinery.
//!
//! This module provides the error hierarchy shared by every resource:
//! configuration, AWS API failures, the waiter and retry errors raised by
//! [`crate::retry`], and resource-level failures raised by CRUD functions.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::aws::AwsApiError;
use crate::provider::ResourceState;

/// The main error type for awsform.
#[derive(Debug, Error)]
pub enum AwsformError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// AWS API errors.
    #[error(transparent)]
    Aws(#[from] AwsApiError),

    /// A wait or retry loop ran out of time.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A refresh function reported a state that is neither pending nor target.
    #[error(transparent)]
    UnexpectedState(#[from] UnexpectedStateError),

    /// The resource could not be found.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// A lookup that must return one value returned several.
    #[error("too many results: wanted 1, got {count}")]
    TooManyResults {
        /// Number of results returned.
        count: usize,
    },

    /// The resource is still present while waiting for it to disappear.
    #[error("found resource")]
    StillExists,

    /// Creation failed after the remote object came into existence.
    #[error(transparent)]
    PartiallyCreated(#[from] PartiallyCreatedError),

    /// Resource-level errors.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// No AWS region could be resolved.
    #[error("No AWS region configured (set `region` or AWSFORM_REGION)")]
    MissingRegion,
}

/// Errors raised by resource CRUD functions.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource or data source type is not registered.
    #[error("unknown {kind} type: {type_name}")]
    UnknownType {
        /// "resource" or "data source".
        kind: &'static str,
        /// The requested type name.
        type_name: String,
    },

    /// A required attribute is absent.
    #[error("missing required attribute: {name}")]
    MissingAttribute {
        /// Attribute name.
        name: String,
    },

    /// An attribute has the wrong shape or an invalid value.
    #[error("invalid attribute {name}: {message}")]
    InvalidAttribute {
        /// Attribute name.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A resource ID does not match the expected composite format.
    #[error("unexpected format for ID ({id}), {expected}")]
    InvalidId {
        /// The offending ID.
        id: String,
        /// Description of the expected format.
        expected: String,
    },

    /// The parts handed to an ID builder cannot form an ID.
    #[error("{0}")]
    InvalidIdParts(String),

    /// An operation on a specific resource failed.
    #[error("{action} {resource}{}: {source}", display_id(.id))]
    Operation {
        /// Verb describing the operation, e.g. "creating".
        action: &'static str,
        /// Human-readable resource name, e.g. "EBS Volume".
        resource: &'static str,
        /// Resource identifier (may be empty before creation).
        id: String,
        /// Underlying failure.
        #[source]
        source: Box<AwsformError>,
    },
}

/// The waiter or retry deadline elapsed.
#[derive(Debug)]
pub struct TimeoutError {
    /// Last error observed, if any.
    pub last_error: Option<Box<AwsformError>>,
    /// Last state reported by the refresh function.
    pub last_state: String,
    /// The configured timeout.
    pub timeout: Duration,
    /// Target states that were never reached.
    pub expected_state: Vec<String>,
}

/// A refresh function returned a state outside the pending and target sets.
#[derive(Debug)]
pub struct UnexpectedStateError {
    /// Last error observed, if any.
    pub last_error: Option<Box<AwsformError>>,
    /// The unexpected state.
    pub state: String,
    /// Target states.
    pub expected_state: Vec<String>,
}

/// The resource was not found.
#[derive(Debug, Default)]
pub struct NotFoundError {
    /// Last error observed, if any.
    pub last_error: Option<Box<AwsformError>>,
    /// Optional message overriding the default text.
    pub message: String,
    /// How many consecutive refreshes found nothing.
    pub retries: u32,
}

/// A create that failed after the resource got an ID.
///
/// The state is marked tainted so the caller can destroy or recreate it.
#[derive(Debug)]
pub struct PartiallyCreatedError {
    /// State of the resource as far as creation got.
    pub state: Box<ResourceState>,
    /// The error that stopped creation.
    pub source: Box<AwsformError>,
}

fn display_id(id: &str) -> String {
    if id.is_empty() {
        String::new()
    } else {
        format!(" ({id})")
    }
}

/// Result type alias for awsform operations.
pub type Result<T> = std::result::Result<T, AwsformError>;

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = if self.expected_state.is_empty() {
            String::from("resource to be gone")
        } else {
            format!("state to become '{}'", self.expected_state.join(", "))
        };

        let mut extra = Vec::new();
        if !self.last_state.is_empty() {
            extra.push(format!("last state: '{}'", self.last_state));
        }
        if !self.timeout.is_zero() {
            extra.push(format!("timeout: {}", humantime::format_duration(self.timeout)));
        }
        let suffix = if extra.is_empty() {
            String::new()
        } else {
            format!(" ({})", extra.join(", "))
        };

        match &self.last_error {
            Some(err) => write!(f, "timeout while waiting for {expected}{suffix}: {err}"),
            None => write!(f, "timeout while waiting for {expected}{suffix}"),
        }
    }
}

impl std::error::Error for TimeoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for UnexpectedStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unexpected state '{}', wanted target '{}'",
            self.state,
            self.expected_state.join(", ")
        )?;
        if let Some(err) = &self.last_error {
            write!(f, ". last error: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnexpectedStateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for PartiallyCreatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; {}{} exists and is tainted",
            self.source,
            self.state.type_name,
            display_id(self.state.id.as_deref().unwrap_or_default())
        )
    }
}

impl std::error::Error for PartiallyCreatedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            return write!(f, "{}", self.message);
        }
        if self.retries > 0 {
            return write!(f, "couldn't find resource ({} retries)", self.retries);
        }
        write!(f, "couldn't find resource")
    }
}

impl std::error::Error for NotFoundError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.last_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl NotFoundError {
    /// Creates a not-found error wrapping the API error that signalled it.
    #[must_use]
    pub fn from_error(err: impl Into<AwsformError>) -> Self {
        Self {
            last_error: Some(Box::new(err.into())),
            ..Self::default()
        }
    }

    /// Creates a not-found error with a fixed message.
    #[must_use]
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl AwsformError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps this error with the action and resource it happened on.
    #[must_use]
    pub fn during(self, action: &'static str, resource: &'static str, id: impl Into<String>) -> Self {
        Self::Resource(ResourceError::Operation {
            action,
            resource,
            id: id.into(),
            source: Box::new(self),
        })
    }

    /// Returns the tainted state left by a failed create, if any.
    #[must_use]
    pub fn partial_state(&self) -> Option<&ResourceState> {
        match self {
            Self::PartiallyCreated(partial) => Some(&partial.state),
            _ => None,
        }
    }

    /// Strips operation wrappers and returns the innermost error.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Resource(ResourceError::Operation { source, .. }) => source.root(),
            Self::PartiallyCreated(partial) => partial.source.root(),
            other => other,
        }
    }

    /// Returns true if this error means the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    /// Returns true for a timeout that carries no last error.
    ///
    /// Such a timeout means no attempt got to report a failure before the
    /// deadline, so one more attempt is worth making.
    #[must_use]
    pub fn is_resource_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout(t) if t.last_error.is_none())
    }

    /// Returns the AWS API error at the root of this error, if any.
    #[must_use]
    pub fn as_aws(&self) -> Option<&AwsApiError> {
        match self.root() {
            Self::Aws(err) => Some(err),
            Self::NotFound(NotFoundError {
                last_error: Some(inner),
                ..
            }) => inner.as_aws(),
            _ => None,
        }
    }

    /// Returns true if the AWS error code equals any of `codes`.
    #[must_use]
    pub fn aws_code_equals(&self, codes: &[&str]) -> bool {
        self.as_aws().is_some_and(|e| e.code_equals(codes))
    }

    /// Returns true if the AWS error code equals `code` and the message contains `needle`.
    #[must_use]
    pub fn aws_message_contains(&self, code: &str, needle: &str) -> bool {
        self.as_aws().is_some_and(|e| e.message_contains(code, needle))
    }

    /// Returns true if this error is worth retrying regardless of resource semantics.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.as_aws().is_some_and(AwsApiError::is_retryable)
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl ResourceError {
    /// Creates a missing attribute error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingAttribute { name: name.into() }
    }

    /// Creates an invalid attribute error.
    #[must_use]
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_with_state() {
        let err = TimeoutError {
            last_error: None,
            last_state: String::from("creating"),
            timeout: Duration::from_secs(300),
            expected_state: vec![String::from("available")],
        };

        assert_eq!(
            err.to_string(),
            "timeout while waiting for state to become 'available' (last state: 'creating', timeout: 5m)"
        );
    }

    #[test]
    fn test_timeout_message_for_deletion() {
        let err = TimeoutError {
            last_error: Some(Box::new(AwsformError::internal("boom"))),
            last_state: String::new(),
            timeout: Duration::ZERO,
            expected_state: vec![],
        };

        assert_eq!(
            err.to_string(),
            "timeout while waiting for resource to be gone: Internal error: boom"
        );
    }

    #[test]
    fn test_not_found_messages() {
        assert_eq!(NotFoundError::default().to_string(), "couldn't find resource");
        let with_retries = NotFoundError {
            retries: 21,
            ..NotFoundError::default()
        };
        assert_eq!(with_retries.to_string(), "couldn't find resource (21 retries)");
        assert_eq!(NotFoundError::with_message("deleted").to_string(), "deleted");
    }

    #[test]
    fn test_resource_timeout_only_without_last_error() {
        let bare = AwsformError::Timeout(TimeoutError {
            last_error: None,
            last_state: String::new(),
            timeout: Duration::from_secs(1),
            expected_state: vec![String::from("success")],
        });
        assert!(bare.is_resource_timeout());

        let with_cause = AwsformError::Timeout(TimeoutError {
            last_error: Some(Box::new(AwsformError::internal("x"))),
            last_state: String::new(),
            timeout: Duration::from_secs(1),
            expected_state: vec![],
        });
        assert!(!with_cause.is_resource_timeout());
    }

    #[test]
    fn test_operation_wrapper_is_transparent_to_predicates() {
        let err = AwsformError::NotFound(NotFoundError::default()).during(
            "reading",
            "EBS Volume",
            "vol-1",
        );

        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "reading EBS Volume (vol-1): couldn't find resource"
        );
    }

    #[test]
    fn test_aws_code_through_not_found() {
        let api = AwsApiError::new("InvalidVolume.NotFound", "The volume does not exist");
        let err = AwsformError::NotFound(NotFoundError::from_error(api));

        assert!(err.aws_code_equals(&["InvalidVolume.NotFound"]));
        assert!(!err.aws_code_equals(&["VolumeInUse"]));
    }
}
