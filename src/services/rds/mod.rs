//! RDS: cluster instances.

pub mod api;
mod cluster_instance;

pub use api::{ERR_CODE_DB_INSTANCE_NOT_FOUND, RdsApi, SdkRdsApi};
pub use cluster_instance::{
    ERR_CODE_INVALID_DB_INSTANCE_STATE, ERR_CODE_INVALID_PARAMETER_VALUE, RdsClusterInstance,
    find_db_instance_by_id, wait_db_cluster_instance_created, wait_db_cluster_instance_deleted,
    wait_db_cluster_instance_updated,
};
