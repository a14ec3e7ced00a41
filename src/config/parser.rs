//! Configuration parser for provider settings and resource documents.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{AwsformError, ConfigError, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{ProviderConfig, ResourceDocument};

/// Region override, checked before [`ENV_AWS_REGION`].
pub const ENV_REGION: &str = "AWSFORM_REGION";

/// Standard SDK region variable.
pub const ENV_AWS_REGION: &str = "AWS_REGION";

/// Profile override.
pub const ENV_PROFILE: &str = "AWSFORM_PROFILE";

/// Retry count override.
pub const ENV_MAX_RETRIES: &str = "AWSFORM_MAX_RETRIES";

/// Configuration parser for provider settings and documents.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn read_yaml<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let path = self.resolve(path);
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(AwsformError::Config(ConfigError::FileNotFound { path }));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            AwsformError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        parse_yaml(&content, Some(&path))
    }

    /// Loads provider settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        self.read_yaml(path.as_ref())
    }

    /// Parses provider settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML provider configuration");
        parse_yaml(content, source)
    }

    /// Loads provider settings with environment variable overrides.
    ///
    /// Without a file the defaults are used, so a region from the
    /// environment alone is enough.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override has an invalid value.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<ProviderConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => ProviderConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;

        Ok(config)
    }

    /// Loads a resource document or data source query.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_document(&self, path: impl AsRef<Path>) -> Result<ResourceDocument> {
        let doc: ResourceDocument = self.read_yaml(path.as_ref())?;
        debug!("Loaded {} document", doc.type_name);
        Ok(doc)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut ProviderConfig) -> Result<()> {
        if let Some(region) = env_value(ENV_REGION).or_else(|| env_value(ENV_AWS_REGION)) {
            debug!("Overriding region from environment");
            config.region = Some(region);
        }

        if let Some(profile) = env_value(ENV_PROFILE) {
            debug!("Overriding profile from environment");
            config.profile = Some(profile);
        }

        if let Some(retries) = env_value(ENV_MAX_RETRIES) {
            debug!("Overriding max_retries from environment");
            config.max_retries = retries.parse().map_err(|_| {
                AwsformError::Config(ConfigError::validation(
                    format!("{ENV_MAX_RETRIES} must be a positive integer, got '{retries}'"),
                    "max_retries",
                ))
            })?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                AwsformError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_yaml<T: DeserializeOwned>(content: &str, source: Option<&Path>) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| {
        let location = source.map(|p| p.display().to_string());
        AwsformError::Config(ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location,
        })
    })
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["awsform.yaml", "awsform.yml"];

/// Finds the configuration file in the given directory or its parents, then
/// in the user configuration directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    find_config_file_in(start_dir.as_ref(), dirs::config_dir().as_deref())
}

fn find_config_file_in(start: &Path, user_config_dir: Option<&Path>) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(dir) = user_config_dir {
        let config_path = dir.join("awsform").join("config.yaml");
        if config_path.exists() {
            info!("Found user configuration file: {}", config_path.display());
            return Ok(config_path);
        }
    }

    Err(AwsformError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let parser = ConfigParser::new();
        let config = parser.parse_yaml("{}", None).unwrap();

        assert!(config.region.is_none());
        assert_eq!(config.max_retries, 25);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
region: eu-west-3
profile: staging
max_retries: 5
endpoints:
  s3: http://localhost:4566
  ec2: http://localhost:4566
s3_use_path_style: true
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-3"));
        assert_eq!(config.profile.as_deref(), Some("staging"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.endpoints.ec2.as_deref(), Some("http://localhost:4566"));
    }

    #[test]
    fn test_parse_error_reports_location() {
        let parser = ConfigParser::new();
        let err = parser
            .parse_yaml("max_retries: many", Some(Path::new("awsform.yaml")))
            .unwrap_err();

        assert!(matches!(
            err,
            AwsformError::Config(ConfigError::ParseError { location: Some(ref l), .. }) if l == "awsform.yaml"
        ));
    }

    #[test]
    fn test_load_document_relative_to_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bucket.yaml"),
            "type: aws_s3_bucket\nattributes:\n  bucket: logs-bucket\n",
        )
        .unwrap();

        let parser = ConfigParser::new().with_base_path(dir.path());
        let doc = parser.load_document("bucket.yaml").unwrap();

        assert_eq!(doc.type_name, "aws_s3_bucket");
        assert_eq!(
            doc.attributes.get("bucket").and_then(|v| v.as_str()),
            Some("logs-bucket")
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let parser = ConfigParser::new();
        let err = parser.load_file(dir.path().join("nope.yaml")).unwrap_err();

        assert!(matches!(err, AwsformError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("awsform.yml"), "region: us-west-2\n").unwrap();

        let found = find_config_file_in(&nested, None).unwrap();

        assert_eq!(found, dir.path().join("awsform.yml"));
    }

    #[test]
    fn test_find_config_file_falls_back_to_user_dir() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        fs::create_dir_all(user.path().join("awsform")).unwrap();
        fs::write(user.path().join("awsform").join("config.yaml"), "{}").unwrap();

        let found = find_config_file_in(project.path(), Some(user.path())).unwrap();

        assert_eq!(found, user.path().join("awsform").join("config.yaml"));
    }

    #[test]
    fn test_find_config_file_not_found() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();

        let err = find_config_file_in(project.path(), Some(user.path())).unwrap_err();

        assert!(matches!(err, AwsformError::Config(ConfigError::FileNotFound { .. })));
    }
}
