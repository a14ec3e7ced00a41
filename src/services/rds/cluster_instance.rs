//! `aws_rds_cluster_instance` resource.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::{
    CreateDbInstanceInput, DbInstance, ERR_CODE_DB_INSTANCE_NOT_FOUND, ModifyDbInstanceInput, RdsApi,
};
use crate::error::{AwsformError, NotFoundError, Result};
use crate::provider::{Operation, Resource, ResourceData, TimeoutDefaults, create_name, diff_tags};
use crate::retry::{
    StateChangeConf, retry_when_aws_err_code_equals, retry_when_aws_err_message_contains,
    retry_when_new_resource_not_found,
};

/// Resource type name.
pub const TYPE_NAME: &str = "aws_rds_cluster_instance";

const RESOURCE: &str = "RDS Cluster Instance";

/// Error code for invalid request parameters.
pub const ERR_CODE_INVALID_PARAMETER_VALUE: &str = "InvalidParameterValue";

/// Error code for an instance in a state that rejects the call.
pub const ERR_CODE_INVALID_DB_INSTANCE_STATE: &str = "InvalidDBInstanceState";

/// Message returned while a new IAM role has not propagated yet.
const IAM_PROPAGATION_MESSAGE: &str =
    "IAM role ARN value is invalid or does not include the required permissions";

const IAM_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

const INSTANCE_WAIT_DELAY: Duration = Duration::from_secs(30);
const INSTANCE_WAIT_MIN_TIMEOUT: Duration = Duration::from_secs(10);

/// DB instance states.
pub mod status {
    /// Ready for use.
    pub const AVAILABLE: &str = "available";
    /// Backup in progress.
    pub const BACKING_UP: &str = "backing-up";
    /// Enhanced monitoring being enabled or disabled.
    pub const CONFIGURING_ENHANCED_MONITORING: &str = "configuring-enhanced-monitoring";
    /// IAM database authentication being enabled or disabled.
    pub const CONFIGURING_IAM_DATABASE_AUTH: &str = "configuring-iam-database-auth";
    /// Log exports being changed.
    pub const CONFIGURING_LOG_EXPORTS: &str = "configuring-log-exports";
    /// Being created.
    pub const CREATING: &str = "creating";
    /// Being deleted.
    pub const DELETING: &str = "deleting";
    /// Maintenance in progress.
    pub const MAINTENANCE: &str = "maintenance";
    /// Modification in progress.
    pub const MODIFYING: &str = "modifying";
    /// Rebooting.
    pub const REBOOTING: &str = "rebooting";
    /// Being renamed.
    pub const RENAMING: &str = "renaming";
    /// Master credentials being reset.
    pub const RESETTING_MASTER_CREDENTIALS: &str = "resetting-master-credentials";
    /// Starting.
    pub const STARTING: &str = "starting";
    /// Engine upgrade in progress.
    pub const UPGRADING: &str = "upgrading";
}

const CREATE_PENDING: &[&str] = &[
    status::BACKING_UP,
    status::CONFIGURING_ENHANCED_MONITORING,
    status::CONFIGURING_IAM_DATABASE_AUTH,
    status::CONFIGURING_LOG_EXPORTS,
    status::CREATING,
    status::MAINTENANCE,
    status::MODIFYING,
    status::REBOOTING,
    status::RENAMING,
    status::RESETTING_MASTER_CREDENTIALS,
    status::STARTING,
    status::UPGRADING,
];

const UPDATE_PENDING: &[&str] = CREATE_PENDING;

const DELETE_PENDING: &[&str] = &[
    status::CONFIGURING_LOG_EXPORTS,
    status::MODIFYING,
    status::DELETING,
];

/// Attributes that `ModifyDBInstance` can change in place.
const MODIFIABLE_ATTRIBUTES: &[&str] = &[
    "instance_class",
    "promotion_tier",
    "db_parameter_group_name",
    "monitoring_interval",
    "monitoring_role_arn",
    "publicly_accessible",
];

/// Finds a DB instance by identifier.
///
/// # Errors
///
/// Returns [`AwsformError::NotFound`] if the instance does not exist.
pub async fn find_db_instance_by_id(api: &dyn RdsApi, identifier: &str) -> Result<DbInstance> {
    let instance = api.describe_db_instance(identifier).await?;
    if instance.identifier != identifier {
        return Err(AwsformError::NotFound(NotFoundError::default()));
    }
    Ok(instance)
}

async fn status_db_instance(api: &dyn RdsApi, identifier: &str) -> Result<Option<(DbInstance, String)>> {
    match find_db_instance_by_id(api, identifier).await {
        Ok(instance) => {
            let status = instance.status.clone();
            Ok(Some((instance, status)))
        }
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

async fn wait_db_instance_available(
    api: &dyn RdsApi,
    identifier: &str,
    pending: &[&str],
    timeout: Duration,
) -> Result<Option<DbInstance>> {
    StateChangeConf::new(pending, &[status::AVAILABLE], timeout)
        .with_delay(INSTANCE_WAIT_DELAY)
        .with_min_timeout(INSTANCE_WAIT_MIN_TIMEOUT)
        .wait_for_state(|| status_db_instance(api, identifier))
        .await
}

/// Waits for a new cluster instance to become available.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_db_cluster_instance_created(
    api: &dyn RdsApi,
    identifier: &str,
    timeout: Duration,
) -> Result<Option<DbInstance>> {
    wait_db_instance_available(api, identifier, CREATE_PENDING, timeout).await
}

/// Waits for a modified cluster instance to become available again.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_db_cluster_instance_updated(
    api: &dyn RdsApi,
    identifier: &str,
    timeout: Duration,
) -> Result<Option<DbInstance>> {
    wait_db_instance_available(api, identifier, UPDATE_PENDING, timeout).await
}

/// Waits for a cluster instance to disappear.
///
/// # Errors
///
/// Returns the waiter error.
pub async fn wait_db_cluster_instance_deleted(
    api: &dyn RdsApi,
    identifier: &str,
    timeout: Duration,
) -> Result<()> {
    StateChangeConf::new(DELETE_PENDING, &[], timeout)
        .with_delay(INSTANCE_WAIT_DELAY)
        .with_min_timeout(INSTANCE_WAIT_MIN_TIMEOUT)
        .wait_for_state(|| status_db_instance(api, identifier))
        .await
        .map(|_| ())
}

/// Writes the API view of an instance into `data`.
pub fn set_instance_attributes(data: &mut ResourceData, instance: &DbInstance) {
    data.set("identifier", instance.identifier.as_str());
    data.set_opt("cluster_identifier", instance.cluster_identifier.clone());
    data.set_opt("arn", instance.arn.clone());
    data.set_opt("instance_class", instance.instance_class.clone());
    data.set_opt("engine", instance.engine.clone());
    data.set_opt("engine_version", instance.engine_version.clone());
    data.set_opt("endpoint", instance.endpoint.clone());
    data.set_opt("port", instance.port);
    data.set_opt("availability_zone", instance.availability_zone.clone());
    data.set("publicly_accessible", instance.publicly_accessible);
    data.set_opt("promotion_tier", instance.promotion_tier);
    data.set_opt("db_parameter_group_name", instance.db_parameter_group_name.clone());
    data.set_opt("monitoring_interval", instance.monitoring_interval);
    data.set_opt("monitoring_role_arn", instance.monitoring_role_arn.clone());
    data.set("storage_encrypted", instance.storage_encrypted);
    data.set_opt("kms_key_id", instance.kms_key_id.clone());
    data.set_opt("dbi_resource_id", instance.dbi_resource_id.clone());
    data.set("status", instance.status.as_str());
    data.set_string_map("tags", &instance.tags);
}

/// The `aws_rds_cluster_instance` resource.
#[derive(Clone)]
pub struct RdsClusterInstance {
    api: Arc<dyn RdsApi>,
}

impl std::fmt::Debug for RdsClusterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdsClusterInstance").finish_non_exhaustive()
    }
}

impl RdsClusterInstance {
    /// Creates the resource on top of an RDS API.
    #[must_use]
    pub fn new(api: Arc<dyn RdsApi>) -> Self {
        Self { api }
    }

    fn modify_input(data: &ResourceData) -> ModifyDbInstanceInput {
        let changed = |name: &str| data.has_change(name);
        ModifyDbInstanceInput {
            identifier: data.id().to_string(),
            apply_immediately: data.get_bool("apply_immediately"),
            instance_class: changed("instance_class")
                .then(|| data.get_str("instance_class").map(ToString::to_string))
                .flatten(),
            promotion_tier: changed("promotion_tier")
                .then(|| data.get_i32("promotion_tier"))
                .flatten(),
            db_parameter_group_name: changed("db_parameter_group_name")
                .then(|| data.get_str("db_parameter_group_name").map(ToString::to_string))
                .flatten(),
            monitoring_interval: changed("monitoring_interval")
                .then(|| data.get_i32("monitoring_interval"))
                .flatten(),
            monitoring_role_arn: changed("monitoring_role_arn")
                .then(|| data.get_str("monitoring_role_arn").map(ToString::to_string))
                .flatten(),
            publicly_accessible: changed("publicly_accessible")
                .then(|| data.get_bool("publicly_accessible")),
        }
    }
}

#[async_trait]
impl Resource for RdsClusterInstance {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn required_attributes(&self) -> &'static [&'static str] {
        &["cluster_identifier", "instance_class", "engine"]
    }

    fn default_timeouts(&self) -> TimeoutDefaults {
        TimeoutDefaults::uniform(Duration::from_secs(90 * 60))
    }

    async fn create(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let identifier = create_name(data.get_str("identifier"), data.get_str("identifier_prefix"));

        let input = CreateDbInstanceInput {
            identifier: identifier.clone(),
            cluster_identifier: data.require_str("cluster_identifier")?.to_string(),
            instance_class: data.require_str("instance_class")?.to_string(),
            engine: data.require_str("engine")?.to_string(),
            engine_version: data.get_str("engine_version").map(ToString::to_string),
            availability_zone: data.get_str("availability_zone").map(ToString::to_string),
            publicly_accessible: data
                .get("publicly_accessible")
                .map(|_| data.get_bool("publicly_accessible")),
            promotion_tier: data.get_i32("promotion_tier"),
            db_parameter_group_name: data.get_str("db_parameter_group_name").map(ToString::to_string),
            monitoring_interval: data.get_i32("monitoring_interval"),
            monitoring_role_arn: data.get_str("monitoring_role_arn").map(ToString::to_string),
            tags: data.get_string_map("tags"),
        };

        info!("Creating {RESOURCE}: {identifier}");
        retry_when_aws_err_message_contains(
            IAM_PROPAGATION_TIMEOUT,
            || api.create_db_instance(input.clone()),
            ERR_CODE_INVALID_PARAMETER_VALUE,
            IAM_PROPAGATION_MESSAGE,
        )
        .await
        .map_err(|e| e.during("creating", RESOURCE, &identifier))?;

        data.set_id(identifier.as_str());
        data.mark_new_resource();

        wait_db_cluster_instance_created(api, &identifier, data.timeout(Operation::Create))
            .await
            .map_err(|e| e.during("waiting for creation of", RESOURCE, &identifier))?;

        info!("{RESOURCE} created: {identifier}");
        self.read(data).await
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let identifier = data.id().to_string();

        let result = retry_when_new_resource_not_found(
            data.timeout(Operation::Read),
            || find_db_instance_by_id(api, &identifier),
            data.is_new_resource(),
        )
        .await;

        let instance = match result {
            Err(err) if !data.is_new_resource() && err.is_not_found() => {
                warn!("{RESOURCE} ({identifier}) not found, removing from state");
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("reading", RESOURCE, &identifier))?,
        };

        set_instance_attributes(data, &instance);
        Ok(())
    }

    async fn update(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let identifier = data.id().to_string();

        if data.has_changes(MODIFIABLE_ATTRIBUTES) {
            let input = Self::modify_input(data);
            if input.is_empty() {
                debug!("No modifiable setting left for {identifier}");
            } else {
                info!("Modifying {RESOURCE}: {identifier}");
                retry_when_aws_err_message_contains(
                    IAM_PROPAGATION_TIMEOUT,
                    || api.modify_db_instance(input.clone()),
                    ERR_CODE_INVALID_PARAMETER_VALUE,
                    IAM_PROPAGATION_MESSAGE,
                )
                .await
                .map_err(|e| e.during("modifying", RESOURCE, &identifier))?;

                wait_db_cluster_instance_updated(api, &identifier, data.timeout(Operation::Update))
                    .await
                    .map_err(|e| e.during("waiting for update of", RESOURCE, &identifier))?;
            }
        }

        if data.has_change("tags") {
            let arn = data.require_str("arn")?.to_string();
            let (old, new) = data.get_string_map_change("tags");
            let (upsert, removed) = diff_tags(&old, &new);

            if !removed.is_empty() {
                api.remove_tags(&arn, removed)
                    .await
                    .map_err(|e| e.during("updating tags of", RESOURCE, &identifier))?;
            }
            if !upsert.is_empty() {
                api.add_tags(&arn, upsert)
                    .await
                    .map_err(|e| e.during("updating tags of", RESOURCE, &identifier))?;
            }
        }

        self.read(data).await
    }

    async fn delete(&self, data: &mut ResourceData) -> Result<()> {
        let api = self.api.as_ref();
        let identifier = data.id().to_string();
        let timeout = data.timeout(Operation::Delete);

        info!("Deleting {RESOURCE}: {identifier}");
        let result = retry_when_aws_err_code_equals(
            timeout,
            || api.delete_db_instance(&identifier, true),
            &[ERR_CODE_INVALID_DB_INSTANCE_STATE],
        )
        .await;

        match result {
            Err(err) if err.is_not_found() || err.aws_code_equals(&[ERR_CODE_DB_INSTANCE_NOT_FOUND]) => {
                data.clear_id();
                return Ok(());
            }
            other => other.map_err(|e| e.during("deleting", RESOURCE, &identifier))?,
        }

        wait_db_cluster_instance_deleted(api, &identifier, timeout)
            .await
            .map_err(|e| e.during("waiting for deletion of", RESOURCE, &identifier))?;

        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsApiError;
    use crate::services::rds::api::MockRdsApi;
    use serde_json::json;

    fn instance(id: &str, status: &str) -> DbInstance {
        DbInstance {
            identifier: id.to_string(),
            cluster_identifier: Some(String::from("aurora-1")),
            status: status.to_string(),
            arn: Some(format!("arn:aws:rds:us-west-2:123456789012:db:{id}")),
            instance_class: Some(String::from("db.r6g.large")),
            engine: Some(String::from("aurora-postgresql")),
            ..DbInstance::default()
        }
    }

    fn aws(code: &str, message: &str) -> AwsformError {
        AwsformError::Aws(AwsApiError::new(code, message))
    }

    fn not_found() -> AwsformError {
        AwsformError::NotFound(NotFoundError::from_error(aws(ERR_CODE_DB_INSTANCE_NOT_FOUND, "gone")))
    }

    fn planned(value: serde_json::Value) -> ResourceData {
        ResourceData::new(
            TYPE_NAME,
            value.as_object().cloned().unwrap_or_default(),
            TimeoutDefaults::uniform(Duration::from_secs(30 * 60)),
        )
    }

    fn existing(id: &str) -> ResourceData {
        ResourceData::existing(TYPE_NAME, id, TimeoutDefaults::uniform(Duration::from_secs(30 * 60)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_iam_propagation() {
        let mut api = MockRdsApi::new();
        let mut creates = 0;
        api.expect_create_db_instance()
            .withf(|input| input.identifier == "db-1" && input.cluster_identifier == "aurora-1")
            .times(2)
            .returning(move |input| {
                creates += 1;
                if creates == 1 {
                    Err(aws(ERR_CODE_INVALID_PARAMETER_VALUE, IAM_PROPAGATION_MESSAGE))
                } else {
                    Ok(instance(&input.identifier, status::CREATING))
                }
            });
        let mut describes = 0;
        api.expect_describe_db_instance().returning(move |id| {
            describes += 1;
            let status = match describes {
                1 => status::CREATING,
                2 => status::BACKING_UP,
                _ => status::AVAILABLE,
            };
            Ok(instance(id, status))
        });

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = planned(json!({
            "identifier": "db-1",
            "cluster_identifier": "aurora-1",
            "instance_class": "db.r6g.large",
            "engine": "aurora-postgresql"
        }));

        let result = resource.create(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(data.id(), "db-1");
        assert_eq!(data.get_str("status"), Some(status::AVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_prefix_generates_identifier() {
        let mut api = MockRdsApi::new();
        api.expect_create_db_instance()
            .withf(|input| input.identifier.starts_with("app-"))
            .returning(|input| Ok(instance(&input.identifier, status::CREATING)));
        api.expect_describe_db_instance()
            .returning(|id| Ok(instance(id, status::AVAILABLE)));

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = planned(json!({
            "identifier_prefix": "app-",
            "cluster_identifier": "aurora-1",
            "instance_class": "db.r6g.large",
            "engine": "aurora-postgresql"
        }));

        assert!(resource.create(&mut data).await.is_ok());
        assert!(data.id().starts_with("app-"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_fails_on_unexpected_status() {
        let mut api = MockRdsApi::new();
        api.expect_create_db_instance()
            .returning(|input| Ok(instance(&input.identifier, status::CREATING)));
        api.expect_describe_db_instance()
            .returning(|id| Ok(instance(id, "failed")));

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = planned(json!({
            "identifier": "db-1",
            "cluster_identifier": "aurora-1",
            "instance_class": "db.r6g.large",
            "engine": "aurora-postgresql"
        }));

        let result = resource.create(&mut data).await;

        assert!(matches!(
            result.as_ref().map_err(AwsformError::root),
            Err(AwsformError::UnexpectedState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_missing_instance_removes_from_state() {
        let mut api = MockRdsApi::new();
        api.expect_describe_db_instance().times(1).returning(|_| Err(not_found()));

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = existing("db-1");

        assert!(resource.read(&mut data).await.is_ok());
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_modifies_changed_settings_and_tags() {
        let mut api = MockRdsApi::new();
        api.expect_modify_db_instance()
            .withf(|input| {
                input.apply_immediately
                    && input.instance_class.as_deref() == Some("db.r6g.xlarge")
                    && input.promotion_tier.is_none()
            })
            .times(1)
            .returning(|_| Ok(()));
        let mut describes = 0;
        api.expect_describe_db_instance().returning(move |id| {
            describes += 1;
            let status = if describes == 1 { status::MODIFYING } else { status::AVAILABLE };
            Ok(instance(id, status))
        });
        api.expect_remove_tags()
            .withf(|_, keys| *keys == [String::from("old")])
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_add_tags()
            .withf(|arn, tags| arn.ends_with(":db:db-1") && tags.contains_key("new"))
            .times(1)
            .returning(|_, _| Ok(()));

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut prior = existing("db-1");
        set_instance_attributes(&mut prior, &instance("db-1", status::AVAILABLE));
        prior.set("promotion_tier", 1);
        prior.set("tags", json!({"old": "x"}));
        let mut data = ResourceData::for_update(
            prior,
            json!({
                "instance_class": "db.r6g.xlarge",
                "promotion_tier": 1,
                "apply_immediately": true,
                "tags": {"new": "y"}
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );

        let result = resource.update(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_invalid_state() {
        let mut api = MockRdsApi::new();
        let mut deletes = 0;
        api.expect_delete_db_instance()
            .withf(|_, skip| *skip)
            .times(2)
            .returning(move |_, _| {
                deletes += 1;
                if deletes == 1 {
                    Err(aws(ERR_CODE_INVALID_DB_INSTANCE_STATE, "instance is backing-up"))
                } else {
                    Ok(())
                }
            });
        let mut describes = 0;
        api.expect_describe_db_instance().returning(move |id| {
            describes += 1;
            if describes == 1 {
                Ok(instance(id, status::DELETING))
            } else {
                Err(not_found())
            }
        });

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = existing("db-1");

        let result = resource.delete(&mut data).await;

        assert!(result.is_ok(), "{result:?}");
        assert!(data.is_gone());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_already_gone() {
        let mut api = MockRdsApi::new();
        api.expect_delete_db_instance()
            .returning(|_, _| Err(aws(ERR_CODE_DB_INSTANCE_NOT_FOUND, "not found")));
        api.expect_describe_db_instance().never();

        let resource = RdsClusterInstance::new(Arc::new(api));
        let mut data = existing("db-1");

        assert!(resource.delete(&mut data).await.is_ok());
        assert!(data.is_gone());
    }
}
