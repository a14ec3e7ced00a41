//! Registry of resource and data source implementations.
//!
//! The [`Provider`] maps type names to implementations and runs CRUD
//! operations from resource documents, resolving timeouts on the way.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::data::{ResourceData, ResourceState};
use super::resource::{DataSource, Resource};
use super::timeouts::TimeoutDefaults;
use crate::aws::AwsClients;
use crate::config::ResourceDocument;
use crate::error::{AwsformError, NotFoundError, PartiallyCreatedError, ResourceError, Result};
use crate::services::{ec2, eks, rds, s3};

/// Resources and data sources by type name.
#[derive(Clone, Default)]
pub struct Provider {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for a [`Provider`].
#[derive(Default)]
pub struct ProviderBuilder {
    provider: Provider,
}

impl ProviderBuilder {
    /// Registers a resource under its type name.
    #[must_use]
    pub fn resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.provider.resources.insert(resource.type_name(), resource);
        self
    }

    /// Registers a data source under its type name.
    #[must_use]
    pub fn data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.provider
            .data_sources
            .insert(data_source.type_name(), data_source);
        self
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> Provider {
        self.provider
    }
}

impl Provider {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::default()
    }

    /// Registers every supported type on top of the SDK clients.
    #[must_use]
    pub fn from_clients(clients: &AwsClients) -> Self {
        let s3_api: Arc<dyn s3::S3Api> = Arc::new(s3::SdkS3Api::new(clients.s3.clone()));
        let ec2_api: Arc<dyn ec2::Ec2Api> = Arc::new(ec2::SdkEc2Api::new(clients.ec2.clone()));
        let rds_api: Arc<dyn rds::RdsApi> = Arc::new(rds::SdkRdsApi::new(clients.rds.clone()));
        let eks_api: Arc<dyn eks::EksApi> = Arc::new(eks::SdkEksApi::new(clients.eks.clone()));

        Self::builder()
            .resource(Arc::new(s3::S3Bucket::new(
                Arc::clone(&s3_api),
                clients.region.clone(),
                clients.partition,
            )))
            .resource(Arc::new(ec2::EbsVolume::new(Arc::clone(&ec2_api))))
            .resource(Arc::new(rds::RdsClusterInstance::new(rds_api)))
            .resource(Arc::new(eks::EksAddon::new(eks_api)))
            .data_source(Arc::new(ec2::EbsVolumeDataSource::new(ec2_api)))
            .data_source(Arc::new(s3::S3BucketDataSource::new(s3_api, clients.partition)))
            .build()
    }

    /// Looks up a resource implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownType`] for unregistered types.
    pub fn resource(&self, type_name: &str) -> Result<&Arc<dyn Resource>> {
        self.resources.get(type_name).ok_or_else(|| {
            AwsformError::Resource(ResourceError::UnknownType {
                kind: "resource",
                type_name: type_name.to_string(),
            })
        })
    }

    /// Looks up a data source implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownType`] for unregistered types.
    pub fn data_source(&self, type_name: &str) -> Result<&Arc<dyn DataSource>> {
        self.data_sources.get(type_name).ok_or_else(|| {
            AwsformError::Resource(ResourceError::UnknownType {
                kind: "data source",
                type_name: type_name.to_string(),
            })
        })
    }

    /// Registered resource type names, sorted.
    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    /// Registered data source type names, sorted.
    pub fn data_source_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_sources.keys().copied()
    }

    /// Checks that a document names a registered resource and sets its
    /// required attributes.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownType`] or
    /// [`ResourceError::MissingAttribute`].
    pub fn validate_document(&self, doc: &ResourceDocument) -> Result<()> {
        let resource = self.resource(&doc.type_name)?;
        for name in resource.required_attributes() {
            let set = doc
                .attributes
                .get(*name)
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            if !set {
                return Err(AwsformError::Resource(ResourceError::missing(*name)));
            }
        }
        Ok(())
    }

    fn new_data(resource: &dyn Resource, doc: &ResourceDocument) -> ResourceData {
        ResourceData::new(
            resource.type_name(),
            doc.attributes.clone(),
            resource.default_timeouts().resolve(&doc.timeouts),
        )
    }

    /// Creates the resource described by `doc`.
    ///
    /// # Errors
    ///
    /// Returns validation errors or the resource's create error. A failure
    /// after the resource got an ID is returned as
    /// [`AwsformError::PartiallyCreated`] carrying the tainted state.
    pub async fn create(&self, doc: &ResourceDocument) -> Result<ResourceState> {
        self.validate_document(doc)?;
        let resource = self.resource(&doc.type_name)?;
        let mut data = Self::new_data(resource.as_ref(), doc);

        info!("Creating {}", doc.type_name);
        match resource.create(&mut data).await {
            Ok(()) => Ok(data.into_state()),
            Err(err) if data.is_gone() => Err(err),
            Err(err) => {
                warn!("{} ({}) failed during creation, marking tainted", doc.type_name, data.id());
                let mut state = data.into_state();
                state.tainted = true;
                Err(AwsformError::PartiallyCreated(PartiallyCreatedError {
                    state: Box::new(state),
                    source: Box::new(err),
                }))
            }
        }
    }

    /// Reads a resource by ID.
    ///
    /// A resource that no longer exists yields a state without ID.
    ///
    /// # Errors
    ///
    /// Returns the resource's read error.
    pub async fn read(&self, type_name: &str, id: &str) -> Result<ResourceState> {
        let resource = self.resource(type_name)?;
        let mut data = ResourceData::existing(type_name, id, resource.default_timeouts());

        debug!("Reading {type_name} ({id})");
        resource.read(&mut data).await?;
        Ok(data.into_state())
    }

    /// Updates the resource named by `doc.id` to the attributes in `doc`.
    ///
    /// The current state is read first and used as the prior state.
    ///
    /// # Errors
    ///
    /// Returns [`AwsformError::NotFound`] if the resource is gone, or the
    /// resource's update error.
    pub async fn update(&self, doc: &ResourceDocument) -> Result<ResourceState> {
        let resource = self.resource(&doc.type_name)?;
        let id = doc
            .id
            .as_deref()
            .ok_or_else(|| AwsformError::Resource(ResourceError::missing("id")))?;

        let timeouts = resource.default_timeouts().resolve(&doc.timeouts);
        let mut prior = ResourceData::existing(resource.type_name(), id, timeouts);
        resource.read(&mut prior).await?;
        if prior.is_gone() {
            return Err(AwsformError::NotFound(NotFoundError::with_message(format!(
                "{} ({id}) not found",
                doc.type_name
            ))));
        }

        let mut data = ResourceData::for_update(prior, doc.attributes.clone());
        info!("Updating {} ({id})", doc.type_name);
        resource.update(&mut data).await?;
        Ok(data.into_state())
    }

    /// Deletes a resource by ID.
    ///
    /// The prior state is read first and the document's attributes are
    /// applied on top of it, so flags such as `force_destroy` reach the
    /// resource.
    ///
    /// # Errors
    ///
    /// Returns the resource's delete error.
    pub async fn delete(&self, doc: &ResourceDocument) -> Result<()> {
        let resource = self.resource(&doc.type_name)?;
        let id = doc
            .id
            .as_deref()
            .ok_or_else(|| AwsformError::Resource(ResourceError::missing("id")))?;

        let timeouts = resource.default_timeouts().resolve(&doc.timeouts);
        let mut prior = ResourceData::existing(resource.type_name(), id, timeouts);
        resource.read(&mut prior).await?;
        if prior.is_gone() {
            info!("{} ({id}) already gone", doc.type_name);
            return Ok(());
        }

        let mut data = ResourceData::for_update(prior, doc.attributes.clone());
        info!("Deleting {} ({id})", doc.type_name);
        resource.delete(&mut data).await
    }

    /// Imports an existing resource by ID.
    ///
    /// # Errors
    ///
    /// Returns [`AwsformError::NotFound`] if nothing exists under `id`.
    pub async fn import(&self, type_name: &str, id: &str) -> Result<ResourceState> {
        let resource = self.resource(type_name)?;
        let mut data = ResourceData::new(
            resource.type_name(),
            serde_json::Map::new(),
            resource.default_timeouts(),
        );

        info!("Importing {type_name} ({id})");
        resource.import(id, &mut data).await?;
        Ok(data.into_state())
    }

    /// Runs a data source query.
    ///
    /// # Errors
    ///
    /// Returns the data source's read error.
    pub async fn lookup(&self, doc: &ResourceDocument) -> Result<ResourceState> {
        let source = self.data_source(&doc.type_name)?;
        let mut data = ResourceData::new(
            source.type_name(),
            doc.attributes.clone(),
            TimeoutDefaults::default().resolve(&doc.timeouts),
        );

        debug!("Looking up {}", doc.type_name);
        source.read(&mut data).await?;
        Ok(data.into_state())
    }
}
