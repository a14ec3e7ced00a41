//! Shared AWS SDK configuration and service clients.

use aws_config::BehaviorVersion;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::config::Region;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{ConfigError, Result};

/// Region used when S3 reports no location constraint.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Service clients shared by every resource.
#[derive(Debug, Clone)]
pub struct AwsClients {
    /// S3 client.
    pub s3: aws_sdk_s3::Client,
    /// EC2 client.
    pub ec2: aws_sdk_ec2::Client,
    /// RDS client.
    pub rds: aws_sdk_rds::Client,
    /// EKS client.
    pub eks: aws_sdk_eks::Client,
    /// Resolved region name.
    pub region: String,
    /// Partition derived from the region.
    pub partition: &'static str,
}

impl AwsClients {
    /// Loads the SDK configuration and builds all service clients.
    ///
    /// # Errors
    ///
    /// Returns an error if no region can be resolved from the configuration,
    /// the environment or the selected profile.
    pub async fn from_config(config: &ProviderConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_retries));

        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(ToString::to_string)
            .ok_or(ConfigError::MissingRegion)?;

        let mut s3 = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.s3_use_path_style);
        if let Some(url) = &config.endpoints.s3 {
            debug!("Using S3 endpoint override: {url}");
            s3 = s3.endpoint_url(url);
        }

        let mut ec2 = aws_sdk_ec2::config::Builder::from(&sdk_config);
        if let Some(url) = &config.endpoints.ec2 {
            debug!("Using EC2 endpoint override: {url}");
            ec2 = ec2.endpoint_url(url);
        }

        let mut rds = aws_sdk_rds::config::Builder::from(&sdk_config);
        if let Some(url) = &config.endpoints.rds {
            debug!("Using RDS endpoint override: {url}");
            rds = rds.endpoint_url(url);
        }

        let mut eks = aws_sdk_eks::config::Builder::from(&sdk_config);
        if let Some(url) = &config.endpoints.eks {
            debug!("Using EKS endpoint override: {url}");
            eks = eks.endpoint_url(url);
        }

        let partition = partition_for_region(&region);
        info!("AWS clients ready (region: {region}, partition: {partition})");

        Ok(Self {
            s3: aws_sdk_s3::Client::from_conf(s3.build()),
            ec2: aws_sdk_ec2::Client::from_conf(ec2.build()),
            rds: aws_sdk_rds::Client::from_conf(rds.build()),
            eks: aws_sdk_eks::Client::from_conf(eks.build()),
            region,
            partition,
        })
    }
}

/// Returns the AWS partition a region belongs to.
#[must_use]
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else if region.starts_with("us-iso-") {
        "aws-iso"
    } else if region.starts_with("us-isob-") {
        "aws-iso-b"
    } else {
        "aws"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_for_region() {
        assert_eq!(partition_for_region("us-east-1"), "aws");
        assert_eq!(partition_for_region("eu-west-3"), "aws");
        assert_eq!(partition_for_region("cn-north-1"), "aws-cn");
        assert_eq!(partition_for_region("us-gov-west-1"), "aws-us-gov");
        assert_eq!(partition_for_region("us-isob-east-1"), "aws-iso-b");
    }
}
