//! AWS resources and data sources, one module per service.
//!
//! Each service exposes an API trait (the seam that tests mock), an
//! implementation on the AWS SDK client, the find/status/wait functions built
//! on [`crate::retry`], and the CRUD shims implementing
//! [`crate::provider::Resource`] or [`crate::provider::DataSource`].

pub mod ec2;
pub mod eks;
pub mod rds;
pub mod s3;

use aws_sdk_ec2::primitives::DateTime as SmithyDateTime;
use chrono::{DateTime, Utc};

/// Converts an SDK timestamp to `chrono`.
///
/// All service crates share the same timestamp type.
pub(crate) fn to_chrono(time: &SmithyDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}
