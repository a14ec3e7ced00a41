//! Configuration module for awsform.
//!
//! This module handles all configuration-related functionality:
//! - Parsing provider settings from `awsform.yaml` and the environment
//! - Loading resource documents
//! - Validation of configuration values

mod spec;
mod parser;
mod validator;

pub use spec::{DEFAULT_MAX_RETRIES, Endpoints, ProviderConfig, ResourceDocument};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_AWS_REGION, ENV_MAX_RETRIES, ENV_PROFILE, ENV_REGION,
    find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
