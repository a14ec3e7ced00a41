//! EC2 API seam for EBS volumes.

use async_trait::async_trait;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types::{Filter, ResourceType, Tag, TagSpecification, VolumeType};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::services::to_chrono;

/// An EBS volume as seen by the CRUD functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    /// Volume ID.
    pub volume_id: String,
    /// Availability zone.
    pub availability_zone: String,
    /// Size in GiB.
    pub size: Option<i32>,
    /// Volume type, e.g. `gp3`.
    pub volume_type: Option<String>,
    /// Provisioned IOPS.
    pub iops: Option<i32>,
    /// Provisioned throughput in MiB/s.
    pub throughput: Option<i32>,
    /// Whether the volume is encrypted.
    pub encrypted: bool,
    /// KMS key used for encryption.
    pub kms_key_id: Option<String>,
    /// Snapshot the volume was created from.
    pub snapshot_id: Option<String>,
    /// Whether Multi-Attach is enabled.
    pub multi_attach_enabled: bool,
    /// Outpost ARN.
    pub outpost_arn: Option<String>,
    /// Volume state, e.g. `available`.
    pub state: String,
    /// Creation time.
    pub create_time: Option<DateTime<Utc>>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// Parameters of `CreateVolume`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateVolumeInput {
    /// Availability zone.
    pub availability_zone: String,
    /// Size in GiB.
    pub size: Option<i32>,
    /// Source snapshot.
    pub snapshot_id: Option<String>,
    /// Volume type.
    pub volume_type: Option<String>,
    /// Provisioned IOPS.
    pub iops: Option<i32>,
    /// Provisioned throughput.
    pub throughput: Option<i32>,
    /// Encryption flag.
    pub encrypted: Option<bool>,
    /// KMS key.
    pub kms_key_id: Option<String>,
    /// Multi-Attach flag.
    pub multi_attach_enabled: Option<bool>,
    /// Outpost ARN.
    pub outpost_arn: Option<String>,
    /// Idempotency token.
    pub client_token: String,
    /// Tags applied at creation.
    pub tags: BTreeMap<String, String>,
}

/// Parameters of `ModifyVolume`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyVolumeInput {
    /// Volume ID.
    pub volume_id: String,
    /// New size.
    pub size: Option<i32>,
    /// New type.
    pub volume_type: Option<String>,
    /// New IOPS.
    pub iops: Option<i32>,
    /// New throughput.
    pub throughput: Option<i32>,
}

/// Selection of `DescribeVolumes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeQuery {
    /// Explicit volume IDs.
    pub volume_ids: Vec<String>,
    /// Filters by name.
    pub filters: BTreeMap<String, Vec<String>>,
}

impl VolumeQuery {
    /// Selects a single volume by ID.
    #[must_use]
    pub fn by_id(volume_id: &str) -> Self {
        Self {
            volume_ids: vec![volume_id.to_string()],
            filters: BTreeMap::new(),
        }
    }
}

/// Progress of a volume modification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeModification {
    /// Modification state, e.g. `optimizing`.
    pub state: String,
    /// Status message, set on failure.
    pub status_message: Option<String>,
}

/// EC2 operations used by the EBS volume resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Creates a volume and returns its ID.
    async fn create_volume(&self, input: CreateVolumeInput) -> Result<String>;

    /// Lists volumes matching `query`, following pagination.
    async fn describe_volumes(&self, query: VolumeQuery) -> Result<Vec<Volume>>;

    /// Starts a volume modification.
    async fn modify_volume(&self, input: ModifyVolumeInput) -> Result<()>;

    /// Returns the latest modification of a volume.
    async fn describe_volume_modifications(&self, volume_id: &str) -> Result<Vec<VolumeModification>>;

    /// Deletes a volume.
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;

    /// Adds or overwrites tags on a resource.
    async fn create_tags(&self, resource_id: &str, tags: BTreeMap<String, String>) -> Result<()>;

    /// Removes tags from a resource.
    async fn delete_tags(&self, resource_id: &str, keys: Vec<String>) -> Result<()>;
}

/// [`Ec2Api`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkEc2Api {
    client: Client,
}

impl SdkEc2Api {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn from_tags(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect()
}

fn from_sdk_volume(v: &aws_sdk_ec2::types::Volume) -> Volume {
    Volume {
        volume_id: v.volume_id().unwrap_or_default().to_string(),
        availability_zone: v.availability_zone().unwrap_or_default().to_string(),
        size: v.size(),
        volume_type: v.volume_type().map(|t| t.as_str().to_string()),
        iops: v.iops(),
        throughput: v.throughput(),
        encrypted: v.encrypted().unwrap_or(false),
        kms_key_id: v.kms_key_id().map(ToString::to_string),
        snapshot_id: v.snapshot_id().filter(|s| !s.is_empty()).map(ToString::to_string),
        multi_attach_enabled: v.multi_attach_enabled().unwrap_or(false),
        outpost_arn: v.outpost_arn().map(ToString::to_string),
        state: v.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
        create_time: v.create_time().and_then(to_chrono),
        tags: from_tags(v.tags()),
    }
}

#[async_trait]
impl Ec2Api for SdkEc2Api {
    async fn create_volume(&self, input: CreateVolumeInput) -> Result<String> {
        let mut request = self
            .client
            .create_volume()
            .availability_zone(input.availability_zone)
            .client_token(input.client_token)
            .set_size(input.size)
            .set_snapshot_id(input.snapshot_id)
            .set_volume_type(input.volume_type.as_deref().map(VolumeType::from))
            .set_iops(input.iops)
            .set_throughput(input.throughput)
            .set_encrypted(input.encrypted)
            .set_kms_key_id(input.kms_key_id)
            .set_multi_attach_enabled(input.multi_attach_enabled)
            .set_outpost_arn(input.outpost_arn);

        if !input.tags.is_empty() {
            request = request.tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Volume)
                    .set_tags(Some(to_tags(&input.tags)))
                    .build(),
            );
        }

        let output = request.send().await?;
        Ok(output.volume_id().unwrap_or_default().to_string())
    }

    async fn describe_volumes(&self, query: VolumeQuery) -> Result<Vec<Volume>> {
        let filters: Vec<Filter> = query
            .filters
            .into_iter()
            .map(|(name, values)| Filter::builder().name(name).set_values(Some(values)).build())
            .collect();
        let volume_ids = (!query.volume_ids.is_empty()).then_some(query.volume_ids);
        let filters = (!filters.is_empty()).then_some(filters);

        let mut volumes = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .describe_volumes()
                .set_volume_ids(volume_ids.clone())
                .set_filters(filters.clone())
                .set_next_token(next_token.take())
                .send()
                .await?;

            volumes.extend(output.volumes().iter().map(from_sdk_volume));

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        debug!("DescribeVolumes returned {} volumes", volumes.len());
        Ok(volumes)
    }

    async fn modify_volume(&self, input: ModifyVolumeInput) -> Result<()> {
        self.client
            .modify_volume()
            .volume_id(input.volume_id)
            .set_size(input.size)
            .set_volume_type(input.volume_type.as_deref().map(VolumeType::from))
            .set_iops(input.iops)
            .set_throughput(input.throughput)
            .send()
            .await?;
        Ok(())
    }

    async fn describe_volume_modifications(&self, volume_id: &str) -> Result<Vec<VolumeModification>> {
        let output = self
            .client
            .describe_volumes_modifications()
            .volume_ids(volume_id)
            .send()
            .await?;

        Ok(output
            .volumes_modifications()
            .iter()
            .map(|m| VolumeModification {
                state: m
                    .modification_state()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                status_message: m.status_message().map(ToString::to_string),
            })
            .collect())
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        self.client.delete_volume().volume_id(volume_id).send().await?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: BTreeMap<String, String>) -> Result<()> {
        self.client
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(to_tags(&tags)))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, keys: Vec<String>) -> Result<()> {
        let tags = keys.into_iter().map(|k| Tag::builder().key(k).build()).collect();
        self.client
            .delete_tags()
            .resources(resource_id)
            .set_tags(Some(tags))
            .send()
            .await?;
        Ok(())
    }
}
