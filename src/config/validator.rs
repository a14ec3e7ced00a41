//! Configuration validation for provider settings and resource documents.
//!
//! This module checks values before any AWS call is made, collecting every
//! problem instead of stopping at the first one.

use crate::error::{AwsformError, ConfigError, Result};
use tracing::debug;

use super::spec::{ProviderConfig, ResourceDocument};

/// Upper bound for `max_retries`; more attempts only delay failures.
const MAX_RETRIES_LIMIT: u32 = 100;

/// Validator for provider settings and resource documents.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates provider settings.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_region(config, &mut result);
        Self::validate_endpoints(config, &mut result);
        Self::validate_retries(config, &mut result);

        finish(result)
    }

    /// Validates a resource document's shape.
    ///
    /// Type-specific checks happen in the provider registry.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate_document(&self, doc: &ResourceDocument) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if !is_valid_type_name(&doc.type_name) {
            result.errors.push(ValidationError {
                field: String::from("type"),
                message: format!(
                    "Type name '{}' is invalid. Must look like aws_<service>_<name>.",
                    doc.type_name
                ),
            });
        }

        if doc.id.as_deref().is_some_and(str::is_empty) {
            result.errors.push(ValidationError {
                field: String::from("id"),
                message: String::from("ID cannot be empty when set"),
            });
        }

        for (operation, timeout) in doc.timeouts.iter() {
            if timeout.is_zero() {
                result.errors.push(ValidationError {
                    field: format!("timeouts.{}", operation.as_str()),
                    message: String::from("Timeout must be greater than zero"),
                });
            }
        }

        if doc.attributes.is_empty() {
            result
                .warnings
                .push(String::from("attributes: Document sets no attributes"));
        }

        finish(result)
    }

    /// Validates the region name format.
    fn validate_region(config: &ProviderConfig, result: &mut ValidationResult) {
        match config.region.as_deref() {
            None => result.warnings.push(String::from(
                "region: Not set, the SDK region chain will be used",
            )),
            Some(region) if !is_valid_region(region) => result.errors.push(ValidationError {
                field: String::from("region"),
                message: format!("Region '{region}' is invalid. Expected a name like us-west-2."),
            }),
            Some(_) => {}
        }
    }

    /// Validates endpoint overrides.
    fn validate_endpoints(config: &ProviderConfig, result: &mut ValidationResult) {
        for (service, url) in config.endpoints.iter() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                result.errors.push(ValidationError {
                    field: format!("endpoints.{service}"),
                    message: format!("Endpoint '{url}' must be an http or https URL"),
                });
            } else if url.starts_with("http://") {
                result
                    .warnings
                    .push(format!("endpoints.{service}: Plain HTTP endpoint '{url}'"));
            }
        }
    }

    /// Validates retry bounds.
    fn validate_retries(config: &ProviderConfig, result: &mut ValidationResult) {
        if config.max_retries == 0 {
            result.errors.push(ValidationError {
                field: String::from("max_retries"),
                message: String::from("max_retries must be at least 1"),
            });
        } else if config.max_retries > MAX_RETRIES_LIMIT {
            result.errors.push(ValidationError {
                field: String::from("max_retries"),
                message: format!("max_retries must be at most {MAX_RETRIES_LIMIT}"),
            });
        }
    }
}

fn finish(result: ValidationResult) -> Result<ValidationResult> {
    match result.errors.first() {
        None => {
            debug!("Configuration validation passed");
            Ok(result)
        }
        Some(first_error) => Err(AwsformError::Config(ConfigError::ValidationError {
            message: first_error.message.clone(),
            field: Some(first_error.field.clone()),
        })),
    }
}

/// Checks a region name such as `us-west-2` or `us-gov-east-1`.
fn is_valid_region(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    if parts.len() < 3 {
        return false;
    }

    let (last, rest) = match parts.split_last() {
        Some(split) => split,
        None => return false,
    };

    !last.is_empty()
        && last.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
}

/// Type names are lowercase snake case starting with `aws_`.
fn is_valid_type_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("aws_") else {
        return false;
    };

    !rest.is_empty()
        && !rest.starts_with('_')
        && !rest.ends_with('_')
        && !rest.contains("__")
        && rest
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use crate::provider::Timeouts;
    use std::time::Duration;

    #[test]
    fn test_valid_region() {
        assert!(is_valid_region("us-west-2"));
        assert!(is_valid_region("us-gov-east-1"));
        assert!(is_valid_region("cn-north-1"));
    }

    #[test]
    fn test_invalid_region() {
        assert!(!is_valid_region(""));
        assert!(!is_valid_region("us-west"));
        assert!(!is_valid_region("US-West-2"));
        assert!(!is_valid_region("us-west-a"));
    }

    #[test]
    fn test_type_names() {
        assert!(is_valid_type_name("aws_s3_bucket"));
        assert!(is_valid_type_name("aws_rds_cluster_instance"));
        assert!(!is_valid_type_name("s3_bucket"));
        assert!(!is_valid_type_name("aws_"));
        assert!(!is_valid_type_name("aws_S3_bucket"));
        assert!(!is_valid_type_name("aws__bucket"));
    }

    #[test]
    fn test_provider_config() {
        let validator = ConfigValidator::new();
        let config = ProviderConfig {
            region: Some(String::from("eu-west-3")),
            endpoints: Endpoints {
                s3: Some(String::from("http://localhost:4566")),
                ..Endpoints::default()
            },
            ..ProviderConfig::default()
        };

        let result = validator.validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_provider_config_errors() {
        let validator = ConfigValidator::new();
        let config = ProviderConfig {
            region: Some(String::from("mars")),
            max_retries: 0,
            ..ProviderConfig::default()
        };

        let err = validator.validate(&config).unwrap_err();
        assert!(matches!(
            err,
            AwsformError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "region"
        ));
    }

    #[test]
    fn test_bad_endpoint() {
        let validator = ConfigValidator::new();
        let config = ProviderConfig {
            region: Some(String::from("us-east-1")),
            endpoints: Endpoints {
                eks: Some(String::from("localhost:4566")),
                ..Endpoints::default()
            },
            ..ProviderConfig::default()
        };

        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_document_zero_timeout() {
        let validator = ConfigValidator::new();
        let doc = ResourceDocument {
            type_name: String::from("aws_ebs_volume"),
            timeouts: Timeouts {
                create: Some(Duration::ZERO),
                ..Timeouts::default()
            },
            ..ResourceDocument::default()
        };

        let err = validator.validate_document(&doc).unwrap_err();
        assert!(matches!(
            err,
            AwsformError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "timeouts.create"
        ));
    }

    #[test]
    fn test_document_warns_without_attributes() {
        let validator = ConfigValidator::new();
        let doc = ResourceDocument {
            type_name: String::from("aws_s3_bucket"),
            ..ResourceDocument::default()
        };

        let result = validator.validate_document(&doc).unwrap();
        assert_eq!(result.warning_count(), 1);
    }
}
