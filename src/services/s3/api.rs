//! S3 API seam for buckets.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    Delete, ObjectIdentifier, Tag, Tagging, VersioningConfiguration,
};
use std::collections::BTreeMap;

use crate::aws::{AwsApiError, DEFAULT_S3_REGION};
use crate::error::{AwsformError, NotFoundError, Result};

/// Error code for missing tag sets.
const ERR_CODE_NO_SUCH_TAG_SET: &str = "NoSuchTagSet";

/// Parameters of `CreateBucket`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBucketInput {
    /// Bucket name.
    pub bucket: String,
    /// Region the bucket is created in.
    pub region: String,
    /// Canned ACL.
    pub acl: Option<String>,
    /// Enables S3 Object Lock.
    pub object_lock_enabled: bool,
}

/// One object version or delete marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersion {
    /// Object key.
    pub key: String,
    /// Version ID; `None` for unversioned buckets.
    pub version_id: Option<String>,
}

/// One page of `ListObjectVersions`, versions and delete markers merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersionPage {
    /// Versions and delete markers.
    pub objects: Vec<ObjectVersion>,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Version marker for the next page.
    pub next_version_id_marker: Option<String>,
    /// Whether more pages follow.
    pub truncated: bool,
}

/// S3 operations used by the bucket resource and data source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait S3Api: Send + Sync {
    /// Creates a bucket.
    async fn create_bucket(&self, input: CreateBucketInput) -> Result<()>;

    /// Checks that a bucket exists; a missing bucket is [`AwsformError::NotFound`].
    async fn head_bucket(&self, bucket: &str) -> Result<()>;

    /// Returns the raw location constraint of a bucket.
    async fn get_bucket_location(&self, bucket: &str) -> Result<String>;

    /// Returns the versioning status (`Enabled`, `Suspended`) if ever set.
    async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<String>>;

    /// Enables or suspends versioning.
    async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()>;

    /// Returns the bucket tags, empty when none are set.
    async fn get_bucket_tags(&self, bucket: &str) -> Result<BTreeMap<String, String>>;

    /// Replaces the bucket tags.
    async fn put_bucket_tags(&self, bucket: &str, tags: BTreeMap<String, String>) -> Result<()>;

    /// Removes all bucket tags.
    async fn delete_bucket_tags(&self, bucket: &str) -> Result<()>;

    /// Deletes an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// Lists one page of object versions and delete markers.
    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<String>,
        version_id_marker: Option<String>,
    ) -> Result<ObjectVersionPage>;

    /// Deletes a batch of object versions, returning per-object failures.
    async fn delete_objects(
        &self,
        bucket: &str,
        objects: Vec<ObjectVersion>,
        bypass_governance: bool,
    ) -> Result<Vec<String>>;
}

/// [`S3Api`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkS3Api {
    client: Client,
}

impl SdkS3Api {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl S3Api for SdkS3Api {
    async fn create_bucket(&self, input: CreateBucketInput) -> Result<()> {
        let mut request = self
            .client
            .create_bucket()
            .bucket(&input.bucket)
            .acl(BucketCannedAcl::from(input.acl.as_deref().unwrap_or("private")));

        if input.region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(input.region.as_str()))
                    .build(),
            );
        }
        if input.object_lock_enabled {
            request = request.object_lock_enabled_for_bucket(true);
        }

        request.send().await?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let not_found = err.as_service_error().is_some_and(|e| e.is_not_found());
                let api_err = AwsApiError::from_sdk(&err);
                if not_found || api_err.code_equals(&["NotFound", "NoSuchBucket"]) {
                    Err(AwsformError::NotFound(NotFoundError::from_error(api_err)))
                } else {
                    Err(api_err.into())
                }
            }
        }
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        let output = self.client.get_bucket_location().bucket(bucket).send().await?;
        Ok(output
            .location_constraint()
            .map(|c| c.as_str().to_string())
            .unwrap_or_default())
    }

    async fn get_bucket_versioning(&self, bucket: &str) -> Result<Option<String>> {
        let output = self.client.get_bucket_versioning().bucket(bucket).send().await?;
        Ok(output.status().map(|s| s.as_str().to_string()))
    }

    async fn put_bucket_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let status = if enabled {
            BucketVersioningStatus::Enabled
        } else {
            BucketVersioningStatus::Suspended
        };

        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await?;
        Ok(())
    }

    async fn get_bucket_tags(&self, bucket: &str) -> Result<BTreeMap<String, String>> {
        match self.client.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => Ok(output
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect()),
            Err(err) => {
                let api_err = AwsApiError::from_sdk(&err);
                if api_err.code_equals(&[ERR_CODE_NO_SUCH_TAG_SET]) {
                    Ok(BTreeMap::new())
                } else {
                    Err(api_err.into())
                }
            }
        }
    }

    async fn put_bucket_tags(&self, bucket: &str, tags: BTreeMap<String, String>) -> Result<()> {
        let tag_set = tags
            .into_iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(Tagging::builder().set_tag_set(Some(tag_set)).build()?)
            .send()
            .await?;
        Ok(())
    }

    async fn delete_bucket_tags(&self, bucket: &str) -> Result<()> {
        self.client.delete_bucket_tagging().bucket(bucket).send().await?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client.delete_bucket().bucket(bucket).send().await?;
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<String>,
        version_id_marker: Option<String>,
    ) -> Result<ObjectVersionPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .set_key_marker(key_marker)
            .set_version_id_marker(version_id_marker)
            .send()
            .await?;

        let versions = output.versions().iter().filter_map(|v| {
            Some(ObjectVersion {
                key: v.key()?.to_string(),
                version_id: v.version_id().map(ToString::to_string),
            })
        });
        let markers = output.delete_markers().iter().filter_map(|m| {
            Some(ObjectVersion {
                key: m.key()?.to_string(),
                version_id: m.version_id().map(ToString::to_string),
            })
        });

        Ok(ObjectVersionPage {
            objects: versions.chain(markers).collect(),
            next_key_marker: output.next_key_marker().map(ToString::to_string),
            next_version_id_marker: output.next_version_id_marker().map(ToString::to_string),
            truncated: output.is_truncated().unwrap_or(false),
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        objects: Vec<ObjectVersion>,
        bypass_governance: bool,
    ) -> Result<Vec<String>> {
        let identifiers = objects
            .into_iter()
            .map(|o| {
                ObjectIdentifier::builder()
                    .key(o.key)
                    .set_version_id(o.version_id)
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut request = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(Delete::builder().set_objects(Some(identifiers)).quiet(true).build()?);
        if bypass_governance {
            request = request.bypass_governance_retention(true);
        }

        let output = request.send().await?;
        Ok(output
            .errors()
            .iter()
            .map(|e| {
                format!(
                    "{} ({}): {}",
                    e.key().unwrap_or_default(),
                    e.code().unwrap_or_default(),
                    e.message().unwrap_or_default()
                )
            })
            .collect())
    }
}
