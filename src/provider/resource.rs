//! Resource and data source traits.
//!
//! This module defines the interface every AWS resource and data source
//! implements. CRUD functions receive the resource's [`ResourceData`] and
//! write the observed state back into it.

use async_trait::async_trait;

use super::data::ResourceData;
use super::timeouts::TimeoutDefaults;
use crate::error::{AwsformError, NotFoundError, Result};

/// Trait for managed resources.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Gets the resource type name, e.g. `aws_s3_bucket`.
    fn type_name(&self) -> &'static str;

    /// Attributes a document must set for this resource type.
    fn required_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Per-operation timeouts used when a document sets none.
    fn default_timeouts(&self) -> TimeoutDefaults {
        TimeoutDefaults::default()
    }

    /// Creates the resource, then reads it back.
    ///
    /// On success the data carries the new ID.
    async fn create(&self, data: &mut ResourceData) -> Result<()>;

    /// Refreshes the data from AWS.
    ///
    /// A resource that no longer exists clears the ID instead of failing.
    async fn read(&self, data: &mut ResourceData) -> Result<()>;

    /// Applies changed attributes, then reads the resource back.
    async fn update(&self, data: &mut ResourceData) -> Result<()>;

    /// Deletes the resource and clears the ID.
    ///
    /// A resource that is already gone is not an error.
    async fn delete(&self, data: &mut ResourceData) -> Result<()>;

    /// Adopts an existing resource by ID.
    ///
    /// # Errors
    ///
    /// Returns [`AwsformError::NotFound`] if nothing exists under `id`.
    async fn import(&self, id: &str, data: &mut ResourceData) -> Result<()> {
        data.set_id(id);
        self.read(data).await?;
        if data.is_gone() {
            return Err(AwsformError::NotFound(NotFoundError::with_message(format!(
                "cannot import non-existent remote object ({id})"
            ))));
        }
        Ok(())
    }
}

/// Trait for read-only lookups.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Gets the data source type name, e.g. `aws_ebs_volume`.
    fn type_name(&self) -> &'static str;

    /// Looks up the object described by the query attributes in `data`.
    async fn read(&self, data: &mut ResourceData) -> Result<()>;
}
