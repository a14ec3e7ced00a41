//! RDS API seam for cluster instances.

use async_trait::async_trait;
use aws_sdk_rds::Client;
use aws_sdk_rds::types::Tag;
use std::collections::BTreeMap;

use crate::aws::AwsApiError;
use crate::error::{AwsformError, NotFoundError, Result};

/// Error code returned for unknown DB instances.
pub const ERR_CODE_DB_INSTANCE_NOT_FOUND: &str = "DBInstanceNotFound";

/// A DB instance as seen by the CRUD functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbInstance {
    /// Instance identifier.
    pub identifier: String,
    /// Cluster the instance belongs to.
    pub cluster_identifier: Option<String>,
    /// Instance status, e.g. `available`.
    pub status: String,
    /// Instance ARN.
    pub arn: Option<String>,
    /// Instance class, e.g. `db.r6g.large`.
    pub instance_class: Option<String>,
    /// Engine name.
    pub engine: Option<String>,
    /// Engine version.
    pub engine_version: Option<String>,
    /// Endpoint address.
    pub endpoint: Option<String>,
    /// Endpoint port.
    pub port: Option<i32>,
    /// Availability zone.
    pub availability_zone: Option<String>,
    /// Whether the instance has a public address.
    pub publicly_accessible: bool,
    /// Failover priority.
    pub promotion_tier: Option<i32>,
    /// Parameter group name.
    pub db_parameter_group_name: Option<String>,
    /// Enhanced monitoring interval in seconds.
    pub monitoring_interval: Option<i32>,
    /// Role used for enhanced monitoring.
    pub monitoring_role_arn: Option<String>,
    /// Whether storage is encrypted.
    pub storage_encrypted: bool,
    /// KMS key used for storage encryption.
    pub kms_key_id: Option<String>,
    /// Region-unique immutable identifier.
    pub dbi_resource_id: Option<String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// Parameters of `CreateDBInstance` for a cluster member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDbInstanceInput {
    /// Instance identifier.
    pub identifier: String,
    /// Cluster to join.
    pub cluster_identifier: String,
    /// Instance class.
    pub instance_class: String,
    /// Engine name.
    pub engine: String,
    /// Engine version.
    pub engine_version: Option<String>,
    /// Availability zone.
    pub availability_zone: Option<String>,
    /// Public address flag.
    pub publicly_accessible: Option<bool>,
    /// Failover priority.
    pub promotion_tier: Option<i32>,
    /// Parameter group name.
    pub db_parameter_group_name: Option<String>,
    /// Enhanced monitoring interval.
    pub monitoring_interval: Option<i32>,
    /// Enhanced monitoring role.
    pub monitoring_role_arn: Option<String>,
    /// Tags applied at creation.
    pub tags: BTreeMap<String, String>,
}

/// Parameters of `ModifyDBInstance`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyDbInstanceInput {
    /// Instance identifier.
    pub identifier: String,
    /// Apply now instead of in the next maintenance window.
    pub apply_immediately: bool,
    /// New instance class.
    pub instance_class: Option<String>,
    /// New failover priority.
    pub promotion_tier: Option<i32>,
    /// New parameter group.
    pub db_parameter_group_name: Option<String>,
    /// New monitoring interval.
    pub monitoring_interval: Option<i32>,
    /// New monitoring role.
    pub monitoring_role_arn: Option<String>,
    /// New public address flag.
    pub publicly_accessible: Option<bool>,
}

impl ModifyDbInstanceInput {
    /// Returns true if no setting is being changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instance_class.is_none()
            && self.promotion_tier.is_none()
            && self.db_parameter_group_name.is_none()
            && self.monitoring_interval.is_none()
            && self.monitoring_role_arn.is_none()
            && self.publicly_accessible.is_none()
    }
}

/// RDS operations used by the cluster instance resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RdsApi: Send + Sync {
    /// Creates a DB instance.
    async fn create_db_instance(&self, input: CreateDbInstanceInput) -> Result<DbInstance>;

    /// Describes one DB instance; an unknown identifier is [`AwsformError::NotFound`].
    async fn describe_db_instance(&self, identifier: &str) -> Result<DbInstance>;

    /// Modifies a DB instance.
    async fn modify_db_instance(&self, input: ModifyDbInstanceInput) -> Result<()>;

    /// Deletes a DB instance.
    async fn delete_db_instance(&self, identifier: &str, skip_final_snapshot: bool) -> Result<()>;

    /// Adds or overwrites tags on a resource ARN.
    async fn add_tags(&self, arn: &str, tags: BTreeMap<String, String>) -> Result<()>;

    /// Removes tags from a resource ARN.
    async fn remove_tags(&self, arn: &str, keys: Vec<String>) -> Result<()>;
}

/// [`RdsApi`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkRdsApi {
    client: Client,
}

impl SdkRdsApi {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_tags(tags: BTreeMap<String, String>) -> Vec<Tag> {
    tags.into_iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn from_sdk_instance(i: &aws_sdk_rds::types::DbInstance) -> DbInstance {
    DbInstance {
        identifier: i.db_instance_identifier().unwrap_or_default().to_string(),
        cluster_identifier: i.db_cluster_identifier().map(ToString::to_string),
        status: i.db_instance_status().unwrap_or_default().to_string(),
        arn: i.db_instance_arn().map(ToString::to_string),
        instance_class: i.db_instance_class().map(ToString::to_string),
        engine: i.engine().map(ToString::to_string),
        engine_version: i.engine_version().map(ToString::to_string),
        endpoint: i.endpoint().and_then(|e| e.address()).map(ToString::to_string),
        port: i.endpoint().and_then(aws_sdk_rds::types::Endpoint::port),
        availability_zone: i.availability_zone().map(ToString::to_string),
        publicly_accessible: i.publicly_accessible().unwrap_or(false),
        promotion_tier: i.promotion_tier(),
        db_parameter_group_name: i
            .db_parameter_groups()
            .first()
            .and_then(|g| g.db_parameter_group_name())
            .map(ToString::to_string),
        monitoring_interval: i.monitoring_interval(),
        monitoring_role_arn: i.monitoring_role_arn().map(ToString::to_string),
        storage_encrypted: i.storage_encrypted().unwrap_or(false),
        kms_key_id: i.kms_key_id().map(ToString::to_string),
        dbi_resource_id: i.dbi_resource_id().map(ToString::to_string),
        tags: i
            .tag_list()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
            .collect(),
    }
}

#[async_trait]
impl RdsApi for SdkRdsApi {
    async fn create_db_instance(&self, input: CreateDbInstanceInput) -> Result<DbInstance> {
        let tags = (!input.tags.is_empty()).then(|| to_tags(input.tags));
        let output = self
            .client
            .create_db_instance()
            .db_instance_identifier(input.identifier)
            .db_cluster_identifier(input.cluster_identifier)
            .db_instance_class(input.instance_class)
            .engine(input.engine)
            .set_engine_version(input.engine_version)
            .set_availability_zone(input.availability_zone)
            .set_publicly_accessible(input.publicly_accessible)
            .set_promotion_tier(input.promotion_tier)
            .set_db_parameter_group_name(input.db_parameter_group_name)
            .set_monitoring_interval(input.monitoring_interval)
            .set_monitoring_role_arn(input.monitoring_role_arn)
            .set_tags(tags)
            .send()
            .await?;

        output
            .db_instance()
            .map(from_sdk_instance)
            .ok_or_else(|| AwsformError::internal("CreateDBInstance returned no instance"))
    }

    async fn describe_db_instance(&self, identifier: &str) -> Result<DbInstance> {
        let output = match self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let api_err = AwsApiError::from_sdk(&err);
                if api_err.code_equals(&[ERR_CODE_DB_INSTANCE_NOT_FOUND]) {
                    return Err(AwsformError::NotFound(NotFoundError::from_error(api_err)));
                }
                return Err(api_err.into());
            }
        };

        let instances: Vec<DbInstance> = output.db_instances().iter().map(from_sdk_instance).collect();
        crate::retry::assert_single_value(instances)
    }

    async fn modify_db_instance(&self, input: ModifyDbInstanceInput) -> Result<()> {
        self.client
            .modify_db_instance()
            .db_instance_identifier(input.identifier)
            .apply_immediately(input.apply_immediately)
            .set_db_instance_class(input.instance_class)
            .set_promotion_tier(input.promotion_tier)
            .set_db_parameter_group_name(input.db_parameter_group_name)
            .set_monitoring_interval(input.monitoring_interval)
            .set_monitoring_role_arn(input.monitoring_role_arn)
            .set_publicly_accessible(input.publicly_accessible)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_db_instance(&self, identifier: &str, skip_final_snapshot: bool) -> Result<()> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(skip_final_snapshot)
            .send()
            .await?;
        Ok(())
    }

    async fn add_tags(&self, arn: &str, tags: BTreeMap<String, String>) -> Result<()> {
        self.client
            .add_tags_to_resource()
            .resource_name(arn)
            .set_tags(Some(to_tags(tags)))
            .send()
            .await?;
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: Vec<String>) -> Result<()> {
        self.client
            .remove_tags_from_resource()
            .resource_name(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await?;
        Ok(())
    }
}
