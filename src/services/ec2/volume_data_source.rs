//! `aws_ebs_volume` data source.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::api::{Ec2Api, Volume, VolumeQuery};
use super::volume::{TYPE_NAME, set_volume_attributes};
use crate::error::{AwsformError, NotFoundError, ResourceError, Result};
use crate::provider::{DataSource, ResourceData};

/// Looks up a single EBS volume by filters.
#[derive(Clone)]
pub struct EbsVolumeDataSource {
    api: Arc<dyn Ec2Api>,
}

impl std::fmt::Debug for EbsVolumeDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EbsVolumeDataSource").finish_non_exhaustive()
    }
}

impl EbsVolumeDataSource {
    /// Creates the data source on top of an EC2 API.
    #[must_use]
    pub fn new(api: Arc<dyn Ec2Api>) -> Self {
        Self { api }
    }
}

/// Reads `filter` as a map from filter name to a value or a list of values.
fn parse_filters(data: &ResourceData) -> Result<BTreeMap<String, Vec<String>>> {
    let Some(raw) = data.get("filter") else {
        return Ok(BTreeMap::new());
    };
    let object = raw
        .as_object()
        .ok_or_else(|| ResourceError::invalid("filter", "expected a map of filter names to values"))?;

    object
        .iter()
        .map(|(name, values)| {
            let values = match values {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|v| v.as_str().map(ToString::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| ResourceError::invalid("filter", format!("values of {name} must be strings")))?,
                _ => {
                    return Err(AwsformError::Resource(ResourceError::invalid(
                        "filter",
                        format!("values of {name} must be a string or a list"),
                    )));
                }
            };
            Ok((name.clone(), values))
        })
        .collect()
}

/// Picks the only volume, or the newest when `most_recent` is set.
fn select_volume(mut volumes: Vec<Volume>, most_recent: bool) -> Result<Volume> {
    match volumes.len() {
        0 => Err(AwsformError::NotFound(NotFoundError::with_message(
            "Your query returned no results. Please change your search criteria and try again.",
        ))),
        1 => volumes
            .pop()
            .ok_or_else(|| AwsformError::internal("single volume vanished")),
        count if !most_recent => Err(AwsformError::Resource(ResourceError::invalid(
            "most_recent",
            format!(
                "your query returned {count} results. Please change your search criteria or set most_recent"
            ),
        ))),
        _ => {
            volumes.sort_by_key(|v| v.create_time);
            volumes
                .pop()
                .ok_or_else(|| AwsformError::internal("volume list vanished"))
        }
    }
}

#[async_trait]
impl DataSource for EbsVolumeDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let mut query = VolumeQuery {
            volume_ids: data.get_string_list("volume_ids"),
            filters: parse_filters(data)?,
        };
        for (key, value) in data.get_string_map("tags") {
            query.filters.insert(format!("tag:{key}"), vec![value]);
        }

        debug!("Looking up EBS volumes with {} filters", query.filters.len());
        let volumes = self
            .api
            .describe_volumes(query)
            .await
            .map_err(|e| e.during("reading", "EBS Volumes", ""))?;

        let volume = select_volume(volumes, data.get_bool("most_recent"))?;
        info!("Found EBS Volume: {}", volume.volume_id);

        data.set_id(volume.volume_id.as_str());
        data.set("volume_id", volume.volume_id.as_str());
        set_volume_attributes(data, &volume);
        Ok(())
    }
}
