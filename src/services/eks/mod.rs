//! EKS: addons.

pub mod api;
mod addon;

pub use addon::{
    ADDON_ID_SEPARATOR, EksAddon, addon_create_resource_id, addon_parse_resource_id,
    find_addon_by_names, wait_addon_created, wait_addon_deleted, wait_addon_update_successful,
};
pub use api::{ERR_CODE_RESOURCE_NOT_FOUND, EksApi, SdkEksApi};
