//! `aws_s3_bucket` resource.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::{CreateBucketInput, S3Api};
use crate::aws::{AwsApiError, DEFAULT_S3_REGION};
use crate::error::{AwsformError, ResourceError, Result};
use crate::provider::{Operation, Resource, ResourceData, TimeoutDefaults, create_name};
use crate::retry::{
    retry_until_not_found, retry_when_aws_err_code_equals, retry_when_new_resource_not_found,
    retry_when_not_found,
};

/// Resource type name.
pub const TYPE_NAME: &str = "aws_s3_bucket";

const RESOURCE: &str = "S3 Bucket";

/// Error code for a bucket that does not exist.
pub const ERR_CODE_NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// Error code for deleting a bucket that still holds objects.
pub const ERR_CODE_BUCKET_NOT_EMPTY: &str = "BucketNotEmpty";

/// Error code for a conflicting concurrent operation on a bucket.
pub const ERR_CODE_OPERATION_ABORTED: &str = "OperationAborted";

/// Error code for a bucket name taken by anyone.
pub const ERR_CODE_BUCKET_ALREADY_EXISTS: &str = "BucketAlreadyExists";

/// How long `CreateBucket` is retried on conflicting operations.
const CREATE_RETRY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How long a new bucket may stay invisible to reads.
const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Checks a bucket name against the S3 naming rules.
///
/// # Errors
///
/// Returns [`ResourceError::InvalidAttribute`] describing the first violation.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |message: &str| Err(AwsformError::Resource(ResourceError::invalid("bucket", message)));

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be between 3 and 63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return invalid("only lowercase letters, numbers, dots and hyphens are allowed");
    }
    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return invalid("must begin and end with a letter or number");
    }
    if name.contains("..") {
        return invalid("must not contain two adjacent periods");
    }
    if name.split('.').count() == 4 && name.split('.').all(|p| p.parse::<u8>().is_ok()) {
        return invalid("must not be formatted as an IP address");
    }
    Ok(())
}

/// Maps a raw location constraint to a region name.
#[must_use]
pub fn normalize_bucket_location(location: &str) -> String {
    match location {
        "" => DEFAULT_S3_REGION.to_string(),
        "EU" => String::from("eu-west-1"),
        other => other.to_string(),
    }
}

/// DNS suffix of a partition.
#[must_use]
pub fn dns_suffix(partition: &str) -> &'static str {
    match partition {
        "aws-cn" => "amazonaws.com.cn",
        "aws-iso" => "c2s.ic.gov",
        "aws-iso-b" => "sc2s.sgov.gov",
        _ => "amazonaws.com",
    }
}

/// Writes the computed naming attributes of a bucket.
pub fn set_bucket_naming(data: &mut ResourceData, bucket: &str, region: &str, partition: &str) {
    let suffix = dns_suffix(partition);
    data.set("bucket", bucket);
    data.set("arn", format!("arn:{partition}:s3:::{bucket}"));
    data.set("region", region);
    data.set("bucket_domain_name", format!("{bucket}.s3.{suffix}"));
    data.set(
        "bucket_regional_domain_name",
        format!("{bucket}.s3.{region}.{suffix}"),
    );
}

fn is_no_such_bucket(err: &AwsformError) -> bool {
    err.aws_code_equals(&[ERR_CODE_NO_SUCH_BUCKET])
}

/// The `aws_s3_bucket` resource.
#[derive(Clone)]
pub struct S3Bucket {
    api: Arc<dyn S3Api>,
    region: String,
    partition: String,
}

impl std::fmt::Debug for S3Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Bucket")
            .field("region", &self.region)
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl S3Bucket {
    /// Creates the resource for buckets in `region`.
    #[must_use]
    pub fn new(api: Arc<dyn S3Api>, region: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
            partition: partition.into(),
        }
    }

    /// Deletes every object version and delete marker, returning how many went.
    async fn empty_bucket(&self, bucket: &str, bypass_governance: bool) -> Result<usize> {
        let mut deleted = 0;
        let mut key_marker = None;
        let mut version_id_marker = None;

        loop {
            let page = self
                .api
                .list_object_versions(bucket, key_marker.take(), version_id_marker.take())
                .await?;

            if !page.objects.is_empty() {
                let count = page.objects.len();
                let failures = self
                    .api
                    .delete_objects(bucket, page.objects, bypass_governance)
                    .await?;
                if let Some(first) = failures.first() {
                    return Err(AwsformError::internal(format!(
                        "deleting {} objects failed, first: {first}",
                        failures.len()
                    )));
                }
                deleted += count;
            }

            if !page.truncated {
                break;
            }
            key_marker = page.next_key_marker;
            version_id_marker = page.next_version_id_marker;
        }

        debug!("Deleted {deleted} object versions from {bucket}");
        Ok(deleted)
    }
}

#[async_trait]
impl Resource for S3Bucket {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn default_timeouts(&self) -> TimeoutDefaults {
        TimeoutDefaults::default().with_delete(Duration::from_secs(60 * 60))
    }

    async fn create(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let bucket = create_name(data.get_str("bucket"), data.get_str("bucket_prefix"));
        validate_bucket_name(&bucket)?;

        // us-east-1 silently succeeds when the caller already owns the bucket.
        if self.region == DEFAULT_S3_REGION && api.head_bucket(&bucket).await.is_ok() {
            return Err(AwsformError::Aws(AwsApiError::new(
                ERR_CODE_BUCKET_ALREADY_EXISTS,
                format!("bucket {bucket} already exists"),
            ))
            .during("creating", RESOURCE, &bucket));
        }

        let input = CreateBucketInput {
            bucket: bucket.clone(),
            region: self.region.clone(),
            acl: data.get_str("acl").map(ToString::to_string),
            object_lock_enabled: data.get_bool("object_lock_enabled"),
        };

        info!("Creating {RESOURCE}: {bucket}");
        retry_when_aws_err_code_equals(
            CREATE_RETRY_TIMEOUT,
            || api.create_bucket(input.clone()),
            &[ERR_CODE_OPERATION_ABORTED],
        )
        .await
        .map_err(|e| e.during("creating", RESOURCE, &bucket))?;

        data.set_id(bucket.as_str());
        data.mark_new_resource();

        retry_when_not_found(data.timeout(Operation::Create), || api.head_bucket(&bucket))
            .await
            .map_err(|e| e.during("waiting for creation of", RESOURCE, &bucket))?;

        info!("{RESOURCE} created: {bucket}");
        self.update(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let bucket = data.id().to_string();
        let is_new = data.is_new_resource();

        let head = retry_when_new_resource_not_found(PROPAGATION_TIMEOUT, || api.head_bucket(&bucket), is_new).await;
        match head {
            Err(err) if !is_new && err.is_not_found() => {
                warn!("{RESOURCE} ({bucket}) not found, removing from state");
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("reading", RESOURCE, &bucket))?,
        }

        let timeout = data.timeout(Operation::Read);
        let lookups = async {
            let location = retry_when_aws_err_code_equals(
                timeout,
                || api.get_bucket_location(&bucket),
                &[ERR_CODE_NO_SUCH_BUCKET],
            )
            .await?;
            let versioning = retry_when_aws_err_code_equals(
                timeout,
                || api.get_bucket_versioning(&bucket),
                &[ERR_CODE_NO_SUCH_BUCKET],
            )
            .await?;
            let tags = retry_when_aws_err_code_equals(
                timeout,
                || api.get_bucket_tags(&bucket),
                &[ERR_CODE_NO_SUCH_BUCKET],
            )
            .await?;
            Ok::<_, AwsformError>((location, versioning, tags))
        };

        // HeadBucket can succeed shortly after a bucket is deleted.
        let (location, versioning, tags) = match lookups.await {
            Err(err) if !is_new && is_no_such_bucket(&err) => {
                warn!("{RESOURCE} ({bucket}) not found, removing from state");
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("reading", RESOURCE, &bucket))?,
        };

        let region = normalize_bucket_location(&location);
        set_bucket_naming(data, &bucket, &region, &self.partition);
        data.set("versioning_enabled", versioning.as_deref() == Some("Enabled"));
        data.set_string_map("tags", &tags);
        Ok(())
    }

    async fn update(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let bucket = data.id().to_string();
        let timeout = data.timeout(if data.is_new_resource() {
            Operation::Create
        } else {
            Operation::Update
        });

        let enabled = data.get_bool("versioning_enabled");
        if data.has_change("versioning_enabled") && (enabled || !data.is_new_resource()) {
            debug!("Setting versioning on {bucket}: {enabled}");
            retry_when_aws_err_code_equals(
                timeout,
                || api.put_bucket_versioning(&bucket, enabled),
                &[ERR_CODE_NO_SUCH_BUCKET],
            )
            .await
            .map_err(|e| e.during("updating versioning of", RESOURCE, &bucket))?;
        }

        if data.has_change("tags") {
            let tags = data.get_string_map("tags");
            debug!("Setting {} tags on {bucket}", tags.len());
            let result = if tags.is_empty() {
                retry_when_aws_err_code_equals(
                    timeout,
                    || api.delete_bucket_tags(&bucket),
                    &[ERR_CODE_NO_SUCH_BUCKET],
                )
                .await
            } else {
                retry_when_aws_err_code_equals(
                    timeout,
                    || api.put_bucket_tags(&bucket, tags.clone()),
                    &[ERR_CODE_NO_SUCH_BUCKET],
                )
                .await
            };
            result.map_err(|e| e.during("updating tags of", RESOURCE, &bucket))?;
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let bucket = data.id().to_string();
        let force_destroy = data.get_bool("force_destroy");

        loop {
            info!("Deleting {RESOURCE}: {bucket}");
            match api.delete_bucket(&bucket).await {
                Ok(()) => break,
                Err(err) if is_no_such_bucket(&err) => {
                    data.clear_id();
                    return Ok(());
                }
                Err(err) if force_destroy && err.aws_code_equals(&[ERR_CODE_BUCKET_NOT_EMPTY]) => {
                    let deleted = self
                        .empty_bucket(&bucket, data.get_bool("object_lock_enabled"))
                        .await
                        .map_err(|e| e.during("emptying", RESOURCE, &bucket))?;
                    if deleted == 0 {
                        return Err(err.during("deleting", RESOURCE, &bucket));
                    }
                }
                Err(err) => return Err(err.during("deleting", RESOURCE, &bucket)),
            }
        }

        retry_until_not_found(data.timeout(Operation::Delete), || api.head_bucket(&bucket))
            .await
            .map_err(|e| e.during("waiting for deletion of", RESOURCE, &bucket))?;

        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotFoundError;
    use crate::services::s3::api::{MockS3Api, ObjectVersion, ObjectVersionPage};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn aws(code: &str) -> AwsformError {
        AwsformError::Aws(AwsApiError::new(code, "message"))
    }

    fn not_found() -> AwsformError {
        AwsformError::NotFound(NotFoundError::from_error(aws("NotFound")))
    }

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::new(
            TYPE_NAME,
            value.as_object().cloned().unwrap_or_default(),
            TimeoutDefaults::uniform(Duration::from_secs(600)),
        )
    }

    fn existing(id: &str) -> ResourceData {
        ResourceData::existing(TYPE_NAME, id, TimeoutDefaults::uniform(Duration::from_secs(600)))
    }

    fn expect_reads(api: &mut MockS3Api) {
        api.expect_get_bucket_location()
            .returning(|_| Ok(String::from("eu-west-3")));
        api.expect_get_bucket_versioning()
            .returning(|_| Ok(Some(String::from("Enabled"))));
        api.expect_get_bucket_tags().returning(|_| {
            Ok(BTreeMap::from([(String::from("team"), String::from("infra"))]))
        });
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("my-bucket.logs").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("192.168.5.4").is_err());
    }

    #[test]
    fn test_normalize_bucket_location() {
        assert_eq!(normalize_bucket_location(""), "us-east-1");
        assert_eq!(normalize_bucket_location("EU"), "eu-west-1");
        assert_eq!(normalize_bucket_location("ap-south-1"), "ap-south-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_operation_aborted() {
        let mut api = MockS3Api::new();
        let mut creates = 0;
        api.expect_create_bucket()
            .withf(|input| input.bucket == "my-bucket" && input.region == "eu-west-3")
            .times(2)
            .returning(move |_| {
                creates += 1;
                if creates == 1 { Err(aws(ERR_CODE_OPERATION_ABORTED)) } else { Ok(()) }
            });
        let mut heads = 0;
        api.expect_head_bucket().returning(move |_| {
            heads += 1;
            if heads == 1 { Err(not_found()) } else { Ok(()) }
        });
        api.expect_put_bucket_versioning()
            .withf(|bucket, enabled| bucket == "my-bucket" && *enabled)
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_put_bucket_tags().times(1).returning(|_, _| Ok(()));
        expect_reads(&mut api);

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = planned(json!({
            "bucket": "my-bucket",
            "versioning_enabled": true,
            "tags": {"team": "infra"}
        }));

        let result = resource.create(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(data.id(), "my-bucket");
        assert_eq!(data.get_str("arn"), Some("arn:aws:s3:::my-bucket"));
        assert_eq!(data.get_str("region"), Some("eu-west-3"));
        assert_eq!(
            data.get_str("bucket_regional_domain_name"),
            Some("my-bucket.s3.eu-west-3.amazonaws.com")
        );
        assert!(data.get_bool("versioning_enabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_in_us_east_1_rejects_owned_bucket() {
        let mut api = MockS3Api::new();
        api.expect_head_bucket().returning(|_| Ok(()));
        api.expect_create_bucket().never();

        let resource = S3Bucket::new(Arc::new(api), "us-east-1", "aws");
        let mut data = planned(json!({"bucket": "taken"}));

        let result = resource.create(&mut data).await;

        assert!(result.is_err_and(|e| e.aws_code_equals(&[ERR_CODE_BUCKET_ALREADY_EXISTS])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_bucket_removes_from_state() {
        let mut api = MockS3Api::new();
        api.expect_head_bucket().times(1).returning(|_| Err(not_found()));

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = existing("gone-bucket");

        assert!(resource.read(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_no_such_bucket_after_head_removes_from_state() {
        let mut api = MockS3Api::new();
        api.expect_head_bucket().returning(|_| Ok(()));
        api.expect_get_bucket_location()
            .times(1)
            .returning(|_| Err(aws(ERR_CODE_NO_SUCH_BUCKET)));

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = existing("racing-bucket");

        assert!(resource.read(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_normalizes_region() {
        let mut api = MockS3Api::new();
        api.expect_head_bucket().returning(|_| Ok(()));
        api.expect_get_bucket_location().returning(|_| Ok(String::new()));
        api.expect_get_bucket_versioning().returning(|_| Ok(None));
        api.expect_get_bucket_tags().returning(|_| Ok(BTreeMap::new()));

        let resource = S3Bucket::new(Arc::new(api), "us-east-1", "aws");
        let mut data = existing("b1-bucket");

        assert!(resource.read(&mut data).await.is_ok());
        assert_eq!(data.get_str("region"), Some("us-east-1"));
        assert!(!data.get_bool("versioning_enabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_force_destroy_empties_bucket() {
        let mut api = MockS3Api::new();
        let mut deletes = 0;
        api.expect_delete_bucket().times(2).returning(move |_| {
            deletes += 1;
            if deletes == 1 { Err(aws(ERR_CODE_BUCKET_NOT_EMPTY)) } else { Ok(()) }
        });
        api.expect_list_object_versions().times(1).returning(|_, _, _| {
            Ok(ObjectVersionPage {
                objects: vec![
                    ObjectVersion {
                        key: String::from("a.txt"),
                        version_id: Some(String::from("v1")),
                    },
                    ObjectVersion {
                        key: String::from("a.txt"),
                        version_id: Some(String::from("v2")),
                    },
                ],
                truncated: false,
                ..ObjectVersionPage::default()
            })
        });
        api.expect_delete_objects()
            .withf(|_, objects, _| objects.len() == 2)
            .times(1)
            .returning(|_, _, _| Ok(vec![]));
        api.expect_head_bucket().returning(|_| Err(not_found()));

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = existing("full-bucket");
        data.set("force_destroy", true);

        let result = resource.delete(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_not_empty_without_force_fails() {
        let mut api = MockS3Api::new();
        api.expect_delete_bucket()
            .times(1)
            .returning(|_| Err(aws(ERR_CODE_BUCKET_NOT_EMPTY)));
        api.expect_list_object_versions().never();

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = existing("full-bucket");

        let result = resource.delete(&mut data).await;

        assert!(result.is_err_and(|e| e.aws_code_equals(&[ERR_CODE_BUCKET_NOT_EMPTY])));
        assert_eq!(data.id(), "full-bucket");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_missing_bucket_succeeds() {
        let mut api = MockS3Api::new();
        api.expect_delete_bucket()
            .returning(|_| Err(aws(ERR_CODE_NO_SUCH_BUCKET)));
        api.expect_head_bucket().never();

        let resource = S3Bucket::new(Arc::new(api), "eu-west-3", "aws");
        let mut data = existing("old-bucket");

        assert!(resource.delete(&mut data).await.is_ok());
        assert!(data.is_gone());
    }
}
