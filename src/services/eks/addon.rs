//! `aws_eks_addon` resource.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::api::{Addon, AddonUpdate, CreateAddonInput, EksApi, ERR_CODE_RESOURCE_NOT_FOUND, UpdateAddonInput};
use crate::error::{AwsformError, NotFoundError, Result};
use crate::provider::{
    Operation, Resource, ResourceData, TimeoutDefaults, diff_tags, expand_resource_id_with_separator,
    flatten_resource_id_with_separator,
};
use crate::retry::{
    StateChangeConf, retry_when, retry_when_new_resource_not_found, set_last_error,
};

/// Resource type name.
pub const TYPE_NAME: &str = "aws_eks_addon";

const RESOURCE: &str = "EKS Add-On";

/// Separator between cluster and addon name in the resource ID.
pub const ADDON_ID_SEPARATOR: &str = ":";

const ADDON_ID_PARTS: usize = 2;

/// Error code for invalid request parameters.
pub const ERR_CODE_INVALID_PARAMETER_EXCEPTION: &str = "InvalidParameterException";

/// How long `CreateAddon` is retried while the cluster or IAM settles.
const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Addon states.
pub mod status {
    /// Being created.
    pub const CREATING: &str = "CREATING";
    /// Ready.
    pub const ACTIVE: &str = "ACTIVE";
    /// Creation failed.
    pub const CREATE_FAILED: &str = "CREATE_FAILED";
    /// Running with health issues.
    pub const DEGRADED: &str = "DEGRADED";
    /// Being deleted.
    pub const DELETING: &str = "DELETING";
    /// Being updated.
    pub const UPDATING: &str = "UPDATING";
}

/// Addon update states.
pub mod update_status {
    /// Update running.
    pub const IN_PROGRESS: &str = "InProgress";
    /// Update done.
    pub const SUCCESSFUL: &str = "Successful";
    /// Update failed.
    pub const FAILED: &str = "Failed";
    /// Update cancelled.
    pub const CANCELLED: &str = "Cancelled";
}

/// Builds the `cluster:addon` resource ID.
///
/// # Errors
///
/// Returns an error if either part is empty.
pub fn addon_create_resource_id(cluster_name: &str, addon_name: &str) -> Result<String> {
    flatten_resource_id_with_separator(
        &[cluster_name, addon_name],
        ADDON_ID_PARTS,
        false,
        ADDON_ID_SEPARATOR,
    )
}

/// Splits a `cluster:addon` resource ID.
///
/// # Errors
///
/// Returns [`crate::error::ResourceError::InvalidId`] for a malformed ID.
pub fn addon_parse_resource_id(id: &str) -> Result<(String, String)> {
    let mut parts = expand_resource_id_with_separator(id, ADDON_ID_PARTS, false, ADDON_ID_SEPARATOR)?
        .into_iter();
    match (parts.next(), parts.next()) {
        (Some(cluster), Some(addon)) => Ok((cluster, addon)),
        _ => Err(AwsformError::internal("composite ID lost its parts")),
    }
}

/// Finds an addon by cluster and name.
///
/// # Errors
///
/// Returns [`AwsformError::NotFound`] if the addon does not exist.
pub async fn find_addon_by_names(api: &dyn EksApi, cluster_name: &str, addon_name: &str) -> Result<Addon> {
    api.describe_addon(cluster_name, addon_name).await
}

async fn status_addon(
    api: &dyn EksApi,
    cluster_name: &str,
    addon_name: &str,
    last: &Mutex<Option<Addon>>,
) -> Result<Option<(Addon, String)>> {
    match find_addon_by_names(api, cluster_name, addon_name).await {
        Ok(addon) => {
            let state = addon.status.clone();
            *last.lock().await = Some(addon.clone());
            Ok(Some((addon, state)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn health_error(addon: Option<Addon>) -> Option<AwsformError> {
    addon
        .filter(|a| a.status == status::CREATE_FAILED || a.status == status::DEGRADED)
        .map(|a| a.health_issues.join("; "))
        .filter(|issues| !issues.is_empty())
        .map(AwsformError::internal)
}

/// Waits for a new addon to become active.
///
/// Health issues of a failed or degraded addon are attached as the last error.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_addon_created(
    api: &dyn EksApi,
    cluster_name: &str,
    addon_name: &str,
    timeout: Duration,
) -> Result<Option<Addon>> {
    let last = Mutex::new(None);
    let last_ref = &last;

    let result = StateChangeConf::new(&[status::CREATING, status::DEGRADED], &[status::ACTIVE], timeout)
        .wait_for_state(|| status_addon(api, cluster_name, addon_name, last_ref))
        .await;

    result.map_err(|err| set_last_error(err, health_error(last.into_inner())))
}

/// Waits for an addon to disappear.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_addon_deleted(
    api: &dyn EksApi,
    cluster_name: &str,
    addon_name: &str,
    timeout: Duration,
) -> Result<()> {
    let last = Mutex::new(None);
    let last_ref = &last;

    StateChangeConf::new(&[status::ACTIVE, status::DELETING], &[], timeout)
        .wait_for_state(|| status_addon(api, cluster_name, addon_name, last_ref))
        .await
        .map(|_| ())
}

/// Waits for an addon update to finish.
///
/// Errors of a failed or cancelled update are attached as the last error.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_addon_update_successful(
    api: &dyn EksApi,
    cluster_name: &str,
    addon_name: &str,
    update_id: &str,
    timeout: Duration,
) -> Result<()> {
    let last: Mutex<Option<AddonUpdate>> = Mutex::new(None);
    let last_ref = &last;

    let result = StateChangeConf::new(&[update_status::IN_PROGRESS], &[update_status::SUCCESSFUL], timeout)
        .wait_for_state(|| async move {
            let update = match api.describe_addon_update(cluster_name, addon_name, update_id).await {
                Err(err) if err.is_not_found() => return Ok(None),
                other => other?,
            };
            let state = update.status.clone();
            *last_ref.lock().await = Some(update.clone());
            Ok(Some((update, state)))
        })
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(err) => {
            let cause = last
                .into_inner()
                .filter(|u| u.status == update_status::FAILED || u.status == update_status::CANCELLED)
                .map(|u| u.errors.join("; "))
                .filter(|errors| !errors.is_empty())
                .map(AwsformError::internal);
            Err(set_last_error(err, cause))
        }
    }
}

/// Writes the API view of an addon into `data`.
pub fn set_addon_attributes(data: &mut ResourceData, addon: &Addon) {
    data.set("cluster_name", addon.cluster_name.as_str());
    data.set("addon_name", addon.addon_name.as_str());
    data.set_opt("arn", addon.arn.clone());
    data.set_opt("addon_version", addon.addon_version.clone());
    data.set_opt("service_account_role_arn", addon.service_account_role_arn.clone());
    data.set_opt("configuration_values", addon.configuration_values.clone());
    data.set_opt("created_at", addon.created_at.map(|t| t.to_rfc3339()));
    data.set_opt("modified_at", addon.modified_at.map(|t| t.to_rfc3339()));
    data.set("status", addon.status.as_str());
    data.set_string_map("tags", &addon.tags);
}

fn is_create_propagation_error(err: &AwsformError) -> bool {
    err.aws_message_contains(ERR_CODE_INVALID_PARAMETER_EXCEPTION, status::CREATE_FAILED)
        || err.aws_message_contains(ERR_CODE_INVALID_PARAMETER_EXCEPTION, "does not exist")
}

/// The `aws_eks_addon` resource.
#[derive(Clone)]
pub struct EksAddon {
    api: Arc<dyn EksApi>,
}

impl std::fmt::Debug for EksAddon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EksAddon").finish_non_exhaustive()
    }
}

impl EksAddon {
    /// Creates the resource on top of an EKS API.
    #[must_use]
    pub fn new(api: Arc<dyn EksApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Resource for EksAddon {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["cluster_name", "addon_name"]
    }

    fn default_timeouts(&self) -> TimeoutDefaults {
        TimeoutDefaults::default().with_delete(Duration::from_secs(40 * 60))
    }

    async fn create(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let cluster_name = data.require_str("cluster_name")?.to_string();
        let addon_name = data.require_str("addon_name")?.to_string();
        let id = addon_create_resource_id(&cluster_name, &addon_name)?;

        let input = CreateAddonInput {
            cluster_name: cluster_name.clone(),
            addon_name: addon_name.clone(),
            addon_version: data.get_str("addon_version").map(ToString::to_string),
            service_account_role_arn: data.get_str("service_account_role_arn").map(ToString::to_string),
            resolve_conflicts: data
                .get_str("resolve_conflicts_on_create")
                .map(ToString::to_string),
            configuration_values: data.get_str("configuration_values").map(ToString::to_string),
            client_request_token: Uuid::new_v4().to_string(),
            tags: data.get_string_map("tags"),
        };

        info!("Creating {RESOURCE}: {id}");
        retry_when(
            PROPAGATION_TIMEOUT,
            || api.create_addon(input.clone()),
            is_create_propagation_error,
        )
        .await
        .map_err(|e| e.during("creating", RESOURCE, &id))?;

        data.set_id(id.as_str());
        data.mark_new_resource();

        wait_addon_created(api, &cluster_name, &addon_name, data.timeout(Operation::Create))
            .await
            .map_err(|e| e.during("waiting for creation of", RESOURCE, &id))?;

        info!("{RESOURCE} created: {id}");
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let id = data.id().to_string();
        let (cluster_name, addon_name) = addon_parse_resource_id(&id)?;

        let result = retry_when_new_resource_not_found(
            data.timeout(Operation::Read),
            || find_addon_by_names(api, &cluster_name, &addon_name),
            data.is_new_resource(),
        )
        .await;

        let addon = match result {
            Err(err) if !data.is_new_resource() && err.is_not_found() => {
                warn!("{RESOURCE} ({id}) not found, removing from state");
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("reading", RESOURCE, &id))?,
        };

        set_addon_attributes(data, &addon);
        Ok(())
    }

    async fn update(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let id = data.id().to_string();
        let (cluster_name, addon_name) = addon_parse_resource_id(&id)?;

        if data.has_changes(&["addon_version", "service_account_role_arn", "configuration_values"]) {
            let input = UpdateAddonInput {
                cluster_name: cluster_name.clone(),
                addon_name: addon_name.clone(),
                addon_version: data.get_str("addon_version").map(ToString::to_string),
                // An empty role removes the association.
                service_account_role_arn: data.has_change("service_account_role_arn").then(|| {
                    data.get_str("service_account_role_arn")
                        .unwrap_or_default()
                        .to_string()
                }),
                resolve_conflicts: data
                    .get_str("resolve_conflicts_on_update")
                    .map(ToString::to_string),
                configuration_values: data
                    .has_change("configuration_values")
                    .then(|| data.get_str("configuration_values").unwrap_or_default().to_string()),
                client_request_token: Uuid::new_v4().to_string(),
            };

            info!("Updating {RESOURCE}: {id}");
            let update_id = api
                .update_addon(input)
                .await
                .map_err(|e| e.during("updating", RESOURCE, &id))?;

            debug!("Waiting for update {update_id} of {id}");
            wait_addon_update_successful(
                api,
                &cluster_name,
                &addon_name,
                &update_id,
                data.timeout(Operation::Update),
            )
            .await
            .map_err(|e| e.during("waiting for update of", RESOURCE, &id))?;
        }

        if data.has_change("tags") {
            let arn = data.require_str("arn")?.to_string();
            let (old, new) = data.get_string_map_change("tags");
            let (upsert, removed) = diff_tags(&old, &new);

            if !removed.is_empty() {
                api.untag_resource(&arn, removed)
                    .await
                    .map_err(|e| e.during("updating tags of", RESOURCE, &id))?;
            }
            if !upsert.is_empty() {
                api.tag_resource(&arn, upsert)
                    .await
                    .map_err(|e| e.during("updating tags of", RESOURCE, &id))?;
            }
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let id = data.id().to_string();
        let (cluster_name, addon_name) = addon_parse_resource_id(&id)?;

        info!("Deleting {RESOURCE}: {id}");
        match api
            .delete_addon(&cluster_name, &addon_name, data.get_bool("preserve"))
            .await
        {
            Err(err) if err.is_not_found() || err.aws_code_equals(&[ERR_CODE_RESOURCE_NOT_FOUND]) => {
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("deleting", RESOURCE, &id))?,
        }

        wait_addon_deleted(api, &cluster_name, &addon_name, data.timeout(Operation::Delete))
            .await
            .map_err(|e| e.during("waiting for deletion of", RESOURCE, &id))?;

        data.clear_id();
        Ok(())
    }

    async fn import(&self, id: &str, data: &mut ResourceData) -> Result<()> {
        let (cluster_name, addon_name) = addon_parse_resource_id(id)?;
        data.set_id(id);
        data.set("cluster_name", cluster_name);
        data.set("addon_name", addon_name);
        self.read(data).await?;
        if data.is_gone() {
            return Err(AwsformError::NotFound(NotFoundError::with_message(format!(
                "{RESOURCE} not found"
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsApiError;
    use crate::services::eks::api::MockEksApi;
    use serde_json::json;

    fn addon(status: &str) -> Addon {
        Addon {
            cluster_name: String::from("prod"),
            addon_name: String::from("vpc-cni"),
            arn: Some(String::from("arn:aws:eks:us-west-2:123456789012:addon/prod/vpc-cni/abc")),
            status: status.to_string(),
            addon_version: Some(String::from("v1.18.0-eksbuild.1")),
            ..Addon::default()
        }
    }

    fn aws(code: &str, message: &str) -> AwsformError {
        AwsformError::Aws(AwsApiError::new(code, message))
    }

    fn not_found() -> AwsformError {
        AwsformError::NotFound(NotFoundError::from_error(aws(ERR_CODE_RESOURCE_NOT_FOUND, "No addon")))
    }

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::new(
            TYPE_NAME,
            value.as_object().cloned().unwrap_or_default(),
            TimeoutDefaults::uniform(Duration::from_secs(20 * 60)),
        )
    }

    fn existing(id: &str) -> ResourceData {
        ResourceData::existing(TYPE_NAME, id, TimeoutDefaults::uniform(Duration::from_secs(20 * 60)))
    }

    #[test]
    fn test_resource_id_round_trip() {
        let id = addon_create_resource_id("prod", "vpc-cni").unwrap_or_default();
        assert_eq!(id, "prod:vpc-cni");

        let parsed = addon_parse_resource_id(&id);
        assert_eq!(
            parsed.ok(),
            Some((String::from("prod"), String::from("vpc-cni")))
        );
    }

    #[test]
    fn test_resource_id_rejects_malformed() {
        let err = addon_parse_resource_id("prod").map(|_| ()).err();
        assert_eq!(
            err.map(|e| e.to_string()),
            Some(String::from(
                "unexpected format for ID (prod), expected 2 parts separated by (:)"
            ))
        );
        assert!(addon_parse_resource_id("prod:").is_err());
        assert!(addon_create_resource_id("", "vpc-cni").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_missing_cluster_then_waits() {
        let mut api = MockEksApi::new();
        let mut creates = 0;
        api.expect_create_addon().times(2).returning(move |_| {
            creates += 1;
            if creates == 1 {
                Err(aws(ERR_CODE_INVALID_PARAMETER_EXCEPTION, "Cluster prod does not exist"))
            } else {
                Ok(addon(status::CREATING))
            }
        });
        let mut describes = 0;
        api.expect_describe_addon().returning(move |_, _| {
            describes += 1;
            Ok(addon(if describes < 3 { status::CREATING } else { status::ACTIVE }))
        });

        let resource = EksAddon::new(Arc::new(api));
        let mut data = planned(json!({"cluster_name": "prod", "addon_name": "vpc-cni"}));

        let result = resource.create(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(data.id(), "prod:vpc-cni");
        assert_eq!(data.get_str("status"), Some(status::ACTIVE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_reports_health_issues() {
        let mut api = MockEksApi::new();
        api.expect_create_addon().returning(|_| Ok(addon(status::CREATING)));
        api.expect_describe_addon().returning(|_, _| {
            Ok(Addon {
                health_issues: vec![String::from("InsufficientNumberOfReplicas: pods pending")],
                ..addon(status::CREATE_FAILED)
            })
        });

        let resource = EksAddon::new(Arc::new(api));
        let mut data = planned(json!({"cluster_name": "prod", "addon_name": "vpc-cni"}));

        let message = resource.create(&mut data).await.err().map(|e| e.to_string());

        assert!(
            message
                .as_deref()
                .is_some_and(|m| m.contains("InsufficientNumberOfReplicas")),
            "{message:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_does_not_retry_other_errors() {
        let mut api = MockEksApi::new();
        api.expect_create_addon()
            .times(1)
            .returning(|_| Err(aws(ERR_CODE_INVALID_PARAMETER_EXCEPTION, "bad version")));

        let resource = EksAddon::new(Arc::new(api));
        let mut data = planned(json!({"cluster_name": "prod", "addon_name": "vpc-cni"}));

        assert!(resource.create(&mut data).await.is_err());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_waits_for_update_and_syncs_tags() {
        let mut api = MockEksApi::new();
        api.expect_update_addon()
            .withf(|input| {
                input.addon_version.as_deref() == Some("v1.19.0-eksbuild.1")
                    && input.service_account_role_arn.is_none()
            })
            .times(1)
            .returning(|_| Ok(String::from("upd-1")));
        let mut polls = 0;
        api.expect_describe_addon_update().returning(move |_, _, id| {
            polls += 1;
            Ok(AddonUpdate {
                id: id.to_string(),
                status: String::from(if polls < 2 {
                    update_status::IN_PROGRESS
                } else {
                    update_status::SUCCESSFUL
                }),
                errors: vec![],
            })
        });
        api.expect_tag_resource()
            .withf(|_, tags| tags.get("env").map(String::as_str) == Some("prod"))
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_untag_resource().never();
        api.expect_describe_addon().returning(|_, _| Ok(addon(status::ACTIVE)));

        let resource = EksAddon::new(Arc::new(api));
        let mut prior = existing("prod:vpc-cni");
        set_addon_attributes(&mut prior, &addon(status::ACTIVE));
        let mut data = ResourceData::for_update(
            prior,
            json!({"addon_version": "v1.19.0-eksbuild.1", "tags": {"env": "prod"}})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );

        let result = resource.update(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_update_reports_errors() {
        let mut api = MockEksApi::new();
        api.expect_update_addon().returning(|_| Ok(String::from("upd-1")));
        api.expect_describe_addon_update().returning(|_, _, id| {
            Ok(AddonUpdate {
                id: id.to_string(),
                status: String::from(update_status::FAILED),
                errors: vec![String::from("ConfigurationConflict: field managed elsewhere")],
            })
        });

        let resource = EksAddon::new(Arc::new(api));
        let mut prior = existing("prod:vpc-cni");
        set_addon_attributes(&mut prior, &addon(status::ACTIVE));
        let mut data = ResourceData::for_update(
            prior,
            json!({"configuration_values": "{\"env\":{}}"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );

        let message = resource.update(&mut data).await.err().map(|e| e.to_string());

        assert!(
            message
                .as_deref()
                .is_some_and(|m| m.contains("ConfigurationConflict")),
            "{message:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_until_gone() {
        let mut api = MockEksApi::new();
        api.expect_delete_addon()
            .withf(|cluster, name, preserve| cluster == "prod" && name == "vpc-cni" && !preserve)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut describes = 0;
        api.expect_describe_addon().returning(move |_, _| {
            describes += 1;
            if describes < 3 { Ok(addon(status::DELETING)) } else { Err(not_found()) }
        });

        let resource = EksAddon::new(Arc::new(api));
        let mut data = existing("prod:vpc-cni");

        let result = resource.delete(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_missing_addon_succeeds() {
        let mut api = MockEksApi::new();
        api.expect_delete_addon()
            .returning(|_, _, _| Err(aws(ERR_CODE_RESOURCE_NOT_FOUND, "No addon")));
        api.expect_describe_addon().never();

        let resource = EksAddon::new(Arc::new(api));
        let mut data = existing("prod:vpc-cni");

        assert!(resource.delete(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_sets_names_from_id() {
        let mut api = MockEksApi::new();
        api.expect_describe_addon()
            .withf(|cluster, name| cluster == "prod" && name == "vpc-cni")
            .returning(|_, _| Ok(addon(status::ACTIVE)));

        let resource = EksAddon::new(Arc::new(api));
        let mut data = planned(json!({}));

        assert!(resource.import("prod:vpc-cni", &mut data).await.is_ok());
        assert_eq!(data.id(), "prod:vpc-cni");
        assert_eq!(data.get_str("cluster_name"), Some("prod"));
        assert_eq!(data.get_str("addon_version"), Some("v1.18.0-eksbuild.1"));
    }
}
