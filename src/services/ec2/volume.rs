//! `aws_ebs_volume` resource.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::api::{CreateVolumeInput, Ec2Api, ModifyVolumeInput, Volume, VolumeQuery};
use crate::error::{AwsformError, NotFoundError, ResourceError, Result};
use crate::provider::{Operation, Resource, ResourceData, TimeoutDefaults, diff_tags};
use crate::retry::{
    StateChangeConf, assert_single_value, retry_when_aws_err_code_equals,
    retry_when_new_resource_not_found, set_last_error,
};

/// Resource type name.
pub const TYPE_NAME: &str = "aws_ebs_volume";

const RESOURCE: &str = "EBS Volume";

/// Error code returned for unknown volume IDs.
pub const ERR_CODE_INVALID_VOLUME_NOT_FOUND: &str = "InvalidVolume.NotFound";

/// Error code returned when deleting an attached volume.
pub const ERR_CODE_VOLUME_IN_USE: &str = "VolumeInUse";

/// Volume states.
pub mod state {
    /// Volume is being created.
    pub const CREATING: &str = "creating";
    /// Volume is ready.
    pub const AVAILABLE: &str = "available";
    /// Volume is attached.
    pub const IN_USE: &str = "in-use";
    /// Volume is being deleted.
    pub const DELETING: &str = "deleting";
    /// Volume is gone.
    pub const DELETED: &str = "deleted";
}

/// Volume modification states.
pub mod modification_state {
    /// Modification in progress.
    pub const MODIFYING: &str = "modifying";
    /// Modification applied, performance still settling.
    pub const OPTIMIZING: &str = "optimizing";
    /// Modification done.
    pub const COMPLETED: &str = "completed";
}

const VOLUME_WAIT_DELAY: Duration = Duration::from_secs(10);
const VOLUME_WAIT_MIN_TIMEOUT: Duration = Duration::from_secs(3);
const MODIFICATION_WAIT_DELAY: Duration = Duration::from_secs(30);
const MODIFICATION_WAIT_MIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Volume types that reset IOPS to a default when switched to.
const IOPS_VOLUME_TYPES: &[&str] = &["io1", "io2", "gp3"];

/// Finds a volume by ID.
///
/// # Errors
///
/// Returns [`AwsformError::NotFound`] if the volume does not exist, is in
/// the `deleted` state, or the API returned a different volume.
pub async fn find_ebs_volume_by_id(api: &dyn Ec2Api, volume_id: &str) -> Result<Volume> {
    let volumes = match api.describe_volumes(VolumeQuery::by_id(volume_id)).await {
        Err(err) if err.aws_code_equals(&[ERR_CODE_INVALID_VOLUME_NOT_FOUND]) => {
            return Err(AwsformError::NotFound(NotFoundError::from_error(err)));
        }
        other => other?,
    };

    let volume = assert_single_value(volumes)?;

    if volume.state == state::DELETED {
        return Err(AwsformError::NotFound(NotFoundError::with_message(state::DELETED)));
    }
    if volume.volume_id != volume_id {
        return Err(AwsformError::NotFound(NotFoundError::default()));
    }

    Ok(volume)
}

async fn status_volume(api: &dyn Ec2Api, volume_id: &str) -> Result<Option<(Volume, String)>> {
    match find_ebs_volume_by_id(api, volume_id).await {
        Ok(volume) => {
            let state = volume.state.clone();
            Ok(Some((volume, state)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Waits for a new volume to become available.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_volume_created(
    api: &dyn Ec2Api,
    volume_id: &str,
    timeout: Duration,
) -> Result<Option<Volume>> {
    StateChangeConf::new(&[state::CREATING], &[state::AVAILABLE], timeout)
        .with_delay(VOLUME_WAIT_DELAY)
        .with_min_timeout(VOLUME_WAIT_MIN_TIMEOUT)
        .wait_for_state(|| status_volume(api, volume_id))
        .await
}

/// Waits for a modified volume to settle.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_volume_updated(
    api: &dyn Ec2Api,
    volume_id: &str,
    timeout: Duration,
) -> Result<Option<Volume>> {
    StateChangeConf::new(
        &[state::CREATING, modification_state::MODIFYING],
        &[state::AVAILABLE, state::IN_USE],
        timeout,
    )
    .with_delay(VOLUME_WAIT_DELAY)
    .with_min_timeout(VOLUME_WAIT_MIN_TIMEOUT)
    .wait_for_state(|| status_volume(api, volume_id))
    .await
}

/// Waits for a volume to disappear.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_volume_deleted(api: &dyn Ec2Api, volume_id: &str, timeout: Duration) -> Result<()> {
    StateChangeConf::new(&[state::DELETING], &[], timeout)
        .with_delay(VOLUME_WAIT_DELAY)
        .with_min_timeout(VOLUME_WAIT_MIN_TIMEOUT)
        .wait_for_state(|| status_volume(api, volume_id))
        .await
        .map(|_| ())
}

/// Waits for the latest modification of a volume to complete.
///
/// On failure the modification status message is attached as the last error.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_volume_modification_complete(
    api: &dyn Ec2Api,
    volume_id: &str,
    timeout: Duration,
) -> Result<()> {
    let last_message: Mutex<Option<String>> = Mutex::new(None);
    let last_message_ref = &last_message;

    let result = StateChangeConf::new(
        &[modification_state::MODIFYING],
        &[modification_state::COMPLETED, modification_state::OPTIMIZING],
        timeout,
    )
    .with_delay(MODIFICATION_WAIT_DELAY)
    .with_min_timeout(MODIFICATION_WAIT_MIN_TIMEOUT)
    .wait_for_state(|| async move {
        let modifications = match api.describe_volume_modifications(volume_id).await {
            Err(err) if err.aws_code_equals(&[ERR_CODE_INVALID_VOLUME_NOT_FOUND]) => return Ok(None),
            other => other?,
        };
        let Some(modification) = modifications.into_iter().next_back() else {
            return Ok(None);
        };

        last_message_ref
            .lock()
            .await
            .clone_from(&modification.status_message);
        let state = modification.state.clone();
        Ok(Some((modification, state)))
    })
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            let cause = last_message
                .into_inner()
                .filter(|m| !m.is_empty())
                .map(AwsformError::internal);
            Err(set_last_error(err, cause))
        }
    }
}

/// The `aws_ebs_volume` resource.
#[derive(Clone)]
pub struct EbsVolume {
    api: Arc<dyn Ec2Api>,
}

impl std::fmt::Debug for EbsVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EbsVolume").finish_non_exhaustive()
    }
}

impl EbsVolume {
    /// Creates the resource on top of an EC2 API.
    #[must_use]
    pub fn new(api: Arc<dyn Ec2Api>) -> Self {
        Self { api }
    }

    async fn update_tags(&self, data: &ResourceData) -> Result<()> {
        let (old, new) = data.get_string_map_change("tags");
        let (upsert, removed) = diff_tags(&old, &new);

        if !removed.is_empty() {
            debug!("Removing {} tags from {}", removed.len(), data.id());
            self.api.delete_tags(data.id(), removed).await?;
        }
        if !upsert.is_empty() {
            debug!("Updating {} tags on {}", upsert.len(), data.id());
            self.api.create_tags(data.id(), upsert).await?;
        }
        Ok(())
    }
}

/// Writes the API view of a volume into `data`.
pub fn set_volume_attributes(data: &mut ResourceData, volume: &Volume) {
    data.set("availability_zone", volume.availability_zone.as_str());
    data.set("encrypted", volume.encrypted);
    data.set_opt("iops", volume.iops);
    data.set_opt("kms_key_id", volume.kms_key_id.clone());
    data.set("multi_attach_enabled", volume.multi_attach_enabled);
    data.set_opt("outpost_arn", volume.outpost_arn.clone());
    data.set_opt("size", volume.size);
    data.set_opt("snapshot_id", volume.snapshot_id.clone());
    data.set_opt("throughput", volume.throughput);
    data.set_opt("type", volume.volume_type.clone());
    data.set("state", volume.state.as_str());
    data.set_opt("create_time", volume.create_time.map(|t| t.to_rfc3339()));
    data.set_string_map("tags", &volume.tags);
}

#[async_trait]
impl Resource for EbsVolume {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["availability_zone"]
    }

    fn default_timeouts(&self) -> TimeoutDefaults {
        TimeoutDefaults::uniform(Duration::from_secs(5 * 60))
    }

    async fn create(&self, data: &mut ResourceData) -> Result<()> {
        let availability_zone = data.require_str("availability_zone")?.to_string();
        if data.get_i32("size").is_none() && data.get_str("snapshot_id").is_none() {
            return Err(AwsformError::Resource(ResourceError::invalid(
                "size",
                "one of size or snapshot_id must be set",
            )));
        }

        let input = CreateVolumeInput {
            availability_zone,
            size: data.get_i32("size"),
            snapshot_id: data.get_str("snapshot_id").map(ToString::to_string),
            volume_type: data.get_str("type").map(ToString::to_string),
            iops: data.get_i32("iops"),
            throughput: data.get_i32("throughput"),
            encrypted: data.get("encrypted").map(|_| data.get_bool("encrypted")),
            kms_key_id: data.get_str("kms_key_id").map(ToString::to_string),
            multi_attach_enabled: data
                .get("multi_attach_enabled")
                .map(|_| data.get_bool("multi_attach_enabled")),
            outpost_arn: data.get_str("outpost_arn").map(ToString::to_string),
            client_token: Uuid::new_v4().to_string(),
            tags: data.get_string_map("tags"),
        };

        info!("Creating {RESOURCE} in {}", input.availability_zone);
        let volume_id = self
            .api
            .create_volume(input)
            .await
            .map_err(|e| e.during("creating", RESOURCE, ""))?;

        data.set_id(volume_id);
        data.mark_new_resource();

        wait_volume_created(self.api.as_ref(), data.id(), data.timeout(Operation::Create))
            .await
            .map_err(|e| e.during("waiting for creation of", RESOURCE, data.id()))?;

        info!("{RESOURCE} created: {}", data.id());
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let volume_id = data.id().to_string();

        let result = retry_when_new_resource_not_found(
            data.timeout(Operation::Read),
            || find_ebs_volume_by_id(api, &volume_id),
            data.is_new_resource(),
        )
        .await;

        let volume = match result {
            Err(err) if !data.is_new_resource() && err.is_not_found() => {
                warn!("{RESOURCE} ({volume_id}) not found, removing from state");
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("reading", RESOURCE, &volume_id))?,
        };

        set_volume_attributes(data, &volume);
        Ok(())
    }

    async fn update(&self, data: &mut ResourceData) -> Result<()> {
        if data.has_changes(&["size", "type", "iops", "throughput"]) {
            let volume_type = data.get_str("type").map(ToString::to_string);
            let mut input = ModifyVolumeInput {
                volume_id: data.id().to_string(),
                ..ModifyVolumeInput::default()
            };

            if data.has_change("iops") {
                input.iops = data.get_i32("iops");
            }
            if data.has_change("size") {
                input.size = data.get_i32("size");
            }
            // Throughput is only valid for gp3 and is dropped unless resent.
            if volume_type.as_deref() == Some("gp3") {
                input.throughput = data.get_i32("throughput");
            }
            if data.has_change("type") {
                if volume_type
                    .as_deref()
                    .is_some_and(|t| IOPS_VOLUME_TYPES.contains(&t))
                {
                    input.iops = data.get_i32("iops");
                }
                input.volume_type = volume_type;
            }

            info!("Modifying {RESOURCE}: {}", data.id());
            self.api
                .modify_volume(input)
                .await
                .map_err(|e| e.during("modifying", RESOURCE, data.id()))?;

            let timeout = data.timeout(Operation::Update);
            wait_volume_modification_complete(self.api.as_ref(), data.id(), timeout)
                .await
                .map_err(|e| e.during("waiting for modification of", RESOURCE, data.id()))?;
            wait_volume_updated(self.api.as_ref(), data.id(), timeout)
                .await
                .map_err(|e| e.during("waiting for update of", RESOURCE, data.id()))?;
        }

        if data.has_change("tags") {
            self.update_tags(data)
                .await
                .map_err(|e| e.during("updating tags of", RESOURCE, data.id()))?;
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let volume_id = data.id().to_string();
        let timeout = data.timeout(Operation::Delete);

        info!("Deleting {RESOURCE}: {volume_id}");
        let result = retry_when_aws_err_code_equals(
            timeout,
            || api.delete_volume(&volume_id),
            &[ERR_CODE_VOLUME_IN_USE],
        )
        .await;

        match result {
            Err(err) if err.aws_code_equals(&[ERR_CODE_INVALID_VOLUME_NOT_FOUND]) => {
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("deleting", RESOURCE, &volume_id))?,
        }

        wait_volume_deleted(api, &volume_id, timeout)
            .await
            .map_err(|e| e.during("waiting for deletion of", RESOURCE, &volume_id))?;

        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsApiError;
    use crate::services::ec2::api::{MockEc2Api, VolumeModification};
    use serde_json::json;

    fn volume(id: &str, state: &str, size: i32) -> Volume {
        Volume {
            volume_id: id.to_string(),
            availability_zone: String::from("us-west-2a"),
            size: Some(size),
            volume_type: Some(String::from("gp3")),
            state: state.to_string(),
            ..Volume::default()
        }
    }

    fn aws(code: &str) -> AwsformError {
        AwsformError::Aws(AwsApiError::new(code, "message"))
    }

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::new(
            TYPE_NAME,
            value.as_object().cloned().unwrap_or_default(),
            TimeoutDefaults::uniform(Duration::from_secs(300)),
        )
    }

    fn existing(id: &str) -> ResourceData {
        ResourceData::existing(TYPE_NAME, id, TimeoutDefaults::uniform(Duration::from_secs(300)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_available() {
        let mut api = MockEc2Api::new();
        api.expect_create_volume()
            .withf(|input| input.availability_zone == "us-west-2a" && input.size == Some(10))
            .times(1)
            .returning(|_| Ok(String::from("vol-1")));

        let mut calls = 0;
        api.expect_describe_volumes().returning(move |_| {
            calls += 1;
            let state = if calls < 3 { "creating" } else { "available" };
            Ok(vec![volume("vol-1", state, 10)])
        });

        let resource = EbsVolume::new(Arc::new(api));
        let mut data = planned(json!({"availability_zone": "us-west-2a", "size": 10}));

        let result = resource.create(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(data.id(), "vol-1");
        assert_eq!(data.get_str("state"), Some("available"));
        assert_eq!(data.get_i32("size"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_requires_size_or_snapshot() {
        let resource = EbsVolume::new(Arc::new(MockEc2Api::new()));
        let mut data = planned(json!({"availability_zone": "us-west-2a"}));

        let result = resource.create(&mut data).await;

        assert!(matches!(
            result,
            Err(AwsformError::Resource(ResourceError::InvalidAttribute { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_volume_removes_from_state() {
        let mut api = MockEc2Api::new();
        api.expect_describe_volumes()
            .times(1)
            .returning(|_| Err(aws(ERR_CODE_INVALID_VOLUME_NOT_FOUND)));

        let resource = EbsVolume::new(Arc::new(api));
        let mut data = existing("vol-1");

        assert!(resource.read(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deleted_volume_removes_from_state() {
        let mut api = MockEc2Api::new();
        api.expect_describe_volumes()
            .returning(|_| Ok(vec![volume("vol-1", state::DELETED, 10)]));

        let resource = EbsVolume::new(Arc::new(api));
        let mut data = existing("vol-1");

        assert!(resource.read(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_rejects_mismatched_id() {
        let mut api = MockEc2Api::new();
        api.expect_describe_volumes()
            .returning(|_| Ok(vec![volume("vol-2", state::AVAILABLE, 10)]));

        let result = find_ebs_volume_by_id(&api, "vol-1").await;

        assert!(result.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_while_in_use() {
        let mut api = MockEc2Api::new();
        let mut deletes = 0;
        api.expect_delete_volume().times(3).returning(move |_| {
            deletes += 1;
            if deletes < 3 { Err(aws(ERR_CODE_VOLUME_IN_USE)) } else { Ok(()) }
        });

        let mut describes = 0;
        api.expect_describe_volumes().returning(move |_| {
            describes += 1;
            if describes < 2 {
                Ok(vec![volume("vol-1", state::DELETING, 10)])
            } else {
                Err(aws(ERR_CODE_INVALID_VOLUME_NOT_FOUND))
            }
        });

        let resource = EbsVolume::new(Arc::new(api));
        let mut data = existing("vol-1");

        let result = resource.delete(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_already_gone() {
        let mut api = MockEc2Api::new();
        api.expect_delete_volume()
            .times(1)
            .returning(|_| Err(aws(ERR_CODE_INVALID_VOLUME_NOT_FOUND)));
        api.expect_describe_volumes().never();

        let resource = EbsVolume::new(Arc::new(api));
        let mut data = existing("vol-1");

        assert!(resource.delete(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_size_modifies_and_waits() {
        let mut api = MockEc2Api::new();
        api.expect_modify_volume()
            .withf(|input| input.volume_id == "vol-1" && input.size == Some(20))
            .times(1)
            .returning(|_| Ok(()));
        api.expect_describe_volume_modifications().returning(|_| {
            Ok(vec![VolumeModification {
                state: String::from(modification_state::OPTIMIZING),
                status_message: None,
            }])
        });
        api.expect_describe_volumes()
            .returning(|_| Ok(vec![volume("vol-1", state::IN_USE, 20)]));

        let resource = EbsVolume::new(Arc::new(api));
        let mut prior = existing("vol-1");
        prior.set("size", 10);
        prior.set("type", "gp2");
        let mut data = ResourceData::for_update(
            prior,
            json!({"size": 20}).as_object().cloned().unwrap_or_default(),
        );

        let result = resource.update(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(data.get_i32("size"), Some(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_modification_reports_status_message() {
        let mut api = MockEc2Api::new();
        api.expect_describe_volume_modifications().returning(|_| {
            Ok(vec![VolumeModification {
                state: String::from("failed"),
                status_message: Some(String::from("size cannot shrink")),
            }])
        });

        let result =
            wait_volume_modification_complete(&api, "vol-1", Duration::from_secs(600)).await;

        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.starts_with("unexpected state 'failed'"), "{message}");
        assert!(message.ends_with("size cannot shrink"), "{message}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_tags_only() {
        let mut api = MockEc2Api::new();
        api.expect_modify_volume().never();
        api.expect_delete_tags()
            .withf(|id, keys| id == "vol-1" && *keys == ["Old"])
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_create_tags()
            .withf(|id, tags| id == "vol-1" && tags.contains_key("Name"))
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_describe_volumes()
            .returning(|_| Ok(vec![volume("vol-1", state::AVAILABLE, 10)]));

        let resource = EbsVolume::new(Arc::new(api));
        let mut prior = existing("vol-1");
        prior.set("tags", json!({"Old": "x"}));
        let mut data = ResourceData::for_update(
            prior,
            json!({"tags": {"Name": "data"}}).as_object().cloned().unwrap_or_default(),
        );

        assert!(resource.update(&mut data).await.is_ok());
    }
}
