//! AWS SDK plumbing shared by all services.
//!
//! This module provides:
//! - Error capture from any SDK client into [`AwsApiError`]
//! - Loading of the shared SDK configuration into [`AwsClients`]

mod client;
mod error;

pub use client::{AwsClients, DEFAULT_S3_REGION, partition_for_region};
pub use error::{AwsApiError, DEPENDENCY_CODES, NOT_FOUND_CODES, THROTTLING_CODES};
