//! Resource model shared by every service.
//!
//! - [`ResourceData`]: planned, prior and computed attributes of one instance
//! - [`Resource`] and [`DataSource`]: the CRUD interface services implement
//! - [`Provider`]: the registry that runs operations from documents
//! - timeouts, composite IDs and generated names

mod data;
mod id;
mod naming;
mod registry;
mod resource;
mod timeouts;

pub use data::{Attributes, ResourceData, ResourceState, diff_tags};
pub use id::{
    RESOURCE_ID_SEPARATOR, expand_resource_id, expand_resource_id_with_separator,
    flatten_resource_id, flatten_resource_id_with_separator,
};
pub use naming::{UNIQUE_ID_PREFIX, UNIQUE_SUFFIX_LEN, create_name, has_generated_suffix};
pub use registry::{Provider, ProviderBuilder};
pub use resource::{DataSource, Resource};
pub use timeouts::{DEFAULT_TIMEOUT, Operation, TimeoutDefaults, Timeouts};
