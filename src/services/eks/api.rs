//! EKS API seam for addons.

use async_trait::async_trait;
use aws_sdk_eks::Client;
use aws_sdk_eks::types::ResolveConflicts;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::aws::AwsApiError;
use crate::error::{AwsformError, NotFoundError, Result};
use crate::services::to_chrono;

/// Error code returned for unknown clusters, addons and updates.
pub const ERR_CODE_RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";

/// An EKS addon as seen by the CRUD functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addon {
    /// Cluster the addon is installed in.
    pub cluster_name: String,
    /// Addon name, e.g. `vpc-cni`.
    pub addon_name: String,
    /// Addon ARN.
    pub arn: Option<String>,
    /// Addon status, e.g. `ACTIVE`.
    pub status: String,
    /// Installed version.
    pub addon_version: Option<String>,
    /// Role of the addon's service account.
    pub service_account_role_arn: Option<String>,
    /// JSON configuration values.
    pub configuration_values: Option<String>,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
    /// Health issues, formatted as `code: message`.
    pub health_issues: Vec<String>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
}

/// Progress of an addon update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddonUpdate {
    /// Update ID.
    pub id: String,
    /// Update status, e.g. `InProgress`.
    pub status: String,
    /// Errors reported for a failed update, formatted as `code: message`.
    pub errors: Vec<String>,
}

/// Parameters of `CreateAddon`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateAddonInput {
    /// Cluster name.
    pub cluster_name: String,
    /// Addon name.
    pub addon_name: String,
    /// Version to install.
    pub addon_version: Option<String>,
    /// Service account role.
    pub service_account_role_arn: Option<String>,
    /// How to resolve conflicts with existing configuration.
    pub resolve_conflicts: Option<String>,
    /// JSON configuration values.
    pub configuration_values: Option<String>,
    /// Idempotency token.
    pub client_request_token: String,
    /// Tags applied at creation.
    pub tags: BTreeMap<String, String>,
}

/// Parameters of `UpdateAddon`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateAddonInput {
    /// Cluster name.
    pub cluster_name: String,
    /// Addon name.
    pub addon_name: String,
    /// New version.
    pub addon_version: Option<String>,
    /// New service account role; an empty string removes it.
    pub service_account_role_arn: Option<String>,
    /// How to resolve conflicts with existing configuration.
    pub resolve_conflicts: Option<String>,
    /// New configuration values.
    pub configuration_values: Option<String>,
    /// Idempotency token.
    pub client_request_token: String,
}

/// EKS operations used by the addon resource.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EksApi: Send + Sync {
    /// Creates an addon.
    async fn create_addon(&self, input: CreateAddonInput) -> Result<Addon>;

    /// Describes an addon; an unknown addon is [`AwsformError::NotFound`].
    async fn describe_addon(&self, cluster_name: &str, addon_name: &str) -> Result<Addon>;

    /// Starts an addon update and returns the update ID.
    async fn update_addon(&self, input: UpdateAddonInput) -> Result<String>;

    /// Describes an addon update; an unknown update is [`AwsformError::NotFound`].
    async fn describe_addon_update(
        &self,
        cluster_name: &str,
        addon_name: &str,
        update_id: &str,
    ) -> Result<AddonUpdate>;

    /// Deletes an addon, optionally leaving its software on the cluster.
    async fn delete_addon(&self, cluster_name: &str, addon_name: &str, preserve: bool) -> Result<()>;

    /// Adds or overwrites tags on a resource ARN.
    async fn tag_resource(&self, arn: &str, tags: BTreeMap<String, String>) -> Result<()>;

    /// Removes tags from a resource ARN.
    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> Result<()>;
}

/// [`EksApi`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkEksApi {
    client: Client,
}

impl SdkEksApi {
    /// Wraps an SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }
}

fn not_found_or<E, R>(err: &aws_sdk_eks::error::SdkError<E, R>) -> AwsformError
where
    E: aws_sdk_eks::error::ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let api_err = AwsApiError::from_sdk(err);
    if api_err.code_equals(&[ERR_CODE_RESOURCE_NOT_FOUND]) {
        AwsformError::NotFound(NotFoundError::from_error(api_err))
    } else {
        api_err.into()
    }
}

fn from_sdk_addon(a: &aws_sdk_eks::types::Addon) -> Addon {
    Addon {
        cluster_name: a.cluster_name().unwrap_or_default().to_string(),
        addon_name: a.addon_name().unwrap_or_default().to_string(),
        arn: a.addon_arn().map(ToString::to_string),
        status: a.status().map(|s| s.as_str().to_string()).unwrap_or_default(),
        addon_version: a.addon_version().map(ToString::to_string),
        service_account_role_arn: a.service_account_role_arn().map(ToString::to_string),
        configuration_values: a.configuration_values().map(ToString::to_string),
        created_at: a.created_at().and_then(to_chrono),
        modified_at: a.modified_at().and_then(to_chrono),
        health_issues: a
            .health()
            .map(|h| {
                h.issues()
                    .iter()
                    .map(|i| {
                        format!(
                            "{}: {}",
                            i.code().map(|c| c.as_str()).unwrap_or_default(),
                            i.message().unwrap_or_default()
                        )
                    })
                    .collect()
            })
            .unwrap_or_default(),
        tags: a
            .tags()
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl EksApi for SdkEksApi {
    async fn create_addon(&self, input: CreateAddonInput) -> Result<Addon> {
        let tags = (!input.tags.is_empty()).then(|| input.tags.into_iter().collect());
        let output = self
            .client
            .create_addon()
            .cluster_name(input.cluster_name)
            .addon_name(input.addon_name)
            .client_request_token(input.client_request_token)
            .set_addon_version(input.addon_version)
            .set_service_account_role_arn(input.service_account_role_arn)
            .set_resolve_conflicts(input.resolve_conflicts.as_deref().map(ResolveConflicts::from))
            .set_configuration_values(input.configuration_values)
            .set_tags(tags)
            .send()
            .await?;

        output
            .addon()
            .map(from_sdk_addon)
            .ok_or_else(|| AwsformError::internal("CreateAddon returned no addon"))
    }

    async fn describe_addon(&self, cluster_name: &str, addon_name: &str) -> Result<Addon> {
        let output = self
            .client
            .describe_addon()
            .cluster_name(cluster_name)
            .addon_name(addon_name)
            .send()
            .await
            .map_err(|e| not_found_or(&e))?;

        output
            .addon()
            .map(from_sdk_addon)
            .ok_or_else(|| AwsformError::NotFound(NotFoundError::with_message("empty result")))
    }

    async fn update_addon(&self, input: UpdateAddonInput) -> Result<String> {
        let output = self
            .client
            .update_addon()
            .cluster_name(input.cluster_name)
            .addon_name(input.addon_name)
            .client_request_token(input.client_request_token)
            .set_addon_version(input.addon_version)
            .set_service_account_role_arn(input.service_account_role_arn)
            .set_resolve_conflicts(input.resolve_conflicts.as_deref().map(ResolveConflicts::from))
            .set_configuration_values(input.configuration_values)
            .send()
            .await?;

        output
            .update()
            .and_then(|u| u.id())
            .map(ToString::to_string)
            .ok_or_else(|| AwsformError::internal("UpdateAddon returned no update ID"))
    }

    async fn describe_addon_update(
        &self,
        cluster_name: &str,
        addon_name: &str,
        update_id: &str,
    ) -> Result<AddonUpdate> {
        let output = self
            .client
            .describe_update()
            .name(cluster_name)
            .addon_name(addon_name)
            .update_id(update_id)
            .send()
            .await
            .map_err(|e| not_found_or(&e))?;

        let update = output
            .update()
            .ok_or_else(|| AwsformError::NotFound(NotFoundError::with_message("empty result")))?;

        Ok(AddonUpdate {
            id: update.id().unwrap_or_default().to_string(),
            status: update.status().map(|s| s.as_str().to_string()).unwrap_or_default(),
            errors: update
                .errors()
                .iter()
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.error_code().map(|c| c.as_str()).unwrap_or_default(),
                        e.error_message().unwrap_or_default()
                    )
                })
                .collect(),
        })
    }

    async fn delete_addon(&self, cluster_name: &str, addon_name: &str, preserve: bool) -> Result<()> {
        self.client
            .delete_addon()
            .cluster_name(cluster_name)
            .addon_name(addon_name)
            .preserve(preserve)
            .send()
            .await?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: BTreeMap<String, String>) -> Result<()> {
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(tags.into_iter().collect()))
            .send()
            .await?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: Vec<String>) -> Result<()> {
        self.client
            .untag_resource()
            .resource_arn(arn)
            .set_tag_keys(Some(keys))
            .send()
            .await?;
        Ok(())
    }
}
