//! S3: buckets.

pub mod api;
mod bucket;
mod bucket_data_source;

pub use api::{S3Api, SdkS3Api};
pub use bucket::{
    ERR_CODE_BUCKET_ALREADY_EXISTS, ERR_CODE_BUCKET_NOT_EMPTY, ERR_CODE_NO_SUCH_BUCKET,
    ERR_CODE_OPERATION_ABORTED, S3Bucket, normalize_bucket_location,
    validate_bucket_name,
};
pub use bucket_data_source::S3BucketDataSource;
