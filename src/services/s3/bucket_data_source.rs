//! `aws_s3_bucket` data source.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::api::S3Api;
use super::bucket::{TYPE_NAME, normalize_bucket_location, set_bucket_naming};
use crate::error::{AwsformError, NotFoundError, Result};
use crate::provider::{DataSource, ResourceData};

/// Looks up an existing bucket by name.
#[derive(Clone)]
pub struct S3BucketDataSource {
    api: Arc<dyn S3Api>,
    partition: String,
}

impl std::fmt::Debug for S3BucketDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3BucketDataSource")
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl S3BucketDataSource {
    /// Creates the data source.
    #[must_use]
    pub fn new(api: Arc<dyn S3Api>, partition: impl Into<String>) -> Self {
        Self {
            api,
            partition: partition.into(),
        }
    }
}

#[async_trait]
impl DataSource for S3BucketDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let bucket = data.require_str("bucket")?.to_string();

        debug!("Looking up S3 Bucket: {bucket}");
        if let Err(err) = self.api.head_bucket(&bucket).await {
            if err.is_not_found() {
                warn!("S3 Bucket {bucket} not found");
                return Err(AwsformError::NotFound(NotFoundError::with_message(format!(
                    "S3 Bucket ({bucket}) not found"
                ))));
            }
            return Err(err.during("reading", "S3 Bucket", &bucket));
        }

        let location = self
            .api
            .get_bucket_location(&bucket)
            .await
            .map_err(|e| e.during("reading location of", "S3 Bucket", &bucket))?;

        let versioning = self
            .api
            .get_bucket_versioning(&bucket)
            .await
            .map_err(|e| e.during("reading versioning of", "S3 Bucket", &bucket))?;
        let tags = self
            .api
            .get_bucket_tags(&bucket)
            .await
            .map_err(|e| e.during("reading tags of", "S3 Bucket", &bucket))?;

        data.set_id(bucket.as_str());
        set_bucket_naming(data, &bucket, &normalize_bucket_location(&location), &self.partition);
        data.set("versioning_enabled", versioning.as_deref() == Some("Enabled"));
        data.set_string_map("tags", &tags);
        Ok(())
    }
}
