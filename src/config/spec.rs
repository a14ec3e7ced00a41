//! Configuration specification types for awsform.
//!
//! This module defines the structs that map to `awsform.yaml` (provider
//! settings) and to the resource documents passed to the CLI.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::Timeouts;

/// Default number of attempts the SDK makes per API call.
pub const DEFAULT_MAX_RETRIES: u32 = 25;

/// Provider-level settings shared by every resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// AWS region; falls back to the SDK's region chain when unset.
    #[serde(default)]
    pub region: Option<String>,
    /// Named profile from the shared AWS config files.
    #[serde(default)]
    pub profile: Option<String>,
    /// Maximum attempts per API call, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-service endpoint overrides.
    #[serde(default)]
    pub endpoints: Endpoints,
    /// Address S3 buckets by path instead of virtual host.
    #[serde(default)]
    pub s3_use_path_style: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            max_retries: DEFAULT_MAX_RETRIES,
            endpoints: Endpoints::default(),
            s3_use_path_style: false,
        }
    }
}

/// Custom endpoint URLs, e.g. for LocalStack.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoints {
    /// S3 endpoint.
    #[serde(default)]
    pub s3: Option<String>,
    /// EC2 endpoint.
    #[serde(default)]
    pub ec2: Option<String>,
    /// RDS endpoint.
    #[serde(default)]
    pub rds: Option<String>,
    /// EKS endpoint.
    #[serde(default)]
    pub eks: Option<String>,
}

impl Endpoints {
    /// Iterates over the configured overrides as `(service, url)`.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("s3", self.s3.as_deref()),
            ("ec2", self.ec2.as_deref()),
            ("rds", self.rds.as_deref()),
            ("eks", self.eks.as_deref()),
        ]
        .into_iter()
        .filter_map(|(service, url)| url.map(|u| (service, u)))
    }
}

/// One resource instance or data source query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceDocument {
    /// Type name, e.g. `aws_s3_bucket`; query files may omit it.
    #[serde(rename = "type", default)]
    pub type_name: String,
    /// ID of an existing resource (for update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Planned attributes or query arguments.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Per-operation timeout overrides.
    #[serde(default)]
    pub timeouts: Timeouts,
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_provider_defaults() {
        let config: ProviderConfig = serde_yaml::from_str("region: eu-west-3\n").unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-3"));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!config.s3_use_path_style);
        assert_eq!(config.endpoints.iter().count(), 0);
    }

    #[test]
    fn test_endpoint_overrides() {
        let yaml = r"
endpoints:
  s3: http://localhost:4566
  eks: http://localhost:4567
s3_use_path_style: true
";
        let config: ProviderConfig = serde_yaml::from_str(yaml).unwrap();
        let endpoints: Vec<_> = config.endpoints.iter().collect();
        assert_eq!(
            endpoints,
            vec![("s3", "http://localhost:4566"), ("eks", "http://localhost:4567")]
        );
        assert!(config.s3_use_path_style);
    }

    #[test]
    fn test_resource_document() {
        let yaml = r"
type: aws_ebs_volume
attributes:
  availability_zone: us-west-2a
  size: 10
  tags:
    Name: data
timeouts:
  create: 10m
";
        let doc: ResourceDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.type_name, "aws_ebs_volume");
        assert!(doc.id.is_none());
        assert_eq!(doc.attributes.get("size"), Some(&Value::from(10)));
        assert_eq!(doc.timeouts.create, Some(Duration::from_secs(600)));
        assert_eq!(doc.timeouts.delete, None);
    }
}
