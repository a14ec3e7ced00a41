//! EC2: EBS volumes.

pub mod api;
mod volume;
mod volume_data_source;

pub use api::{Ec2Api, SdkEc2Api};
pub use volume::{
    EbsVolume, ERR_CODE_INVALID_VOLUME_NOT_FOUND, ERR_CODE_VOLUME_IN_USE, find_ebs_volume_by_id,
    wait_volume_created, wait_volume_deleted, wait_volume_modification_complete,
    wait_volume_updated,
};
pub use volume_data_source::EbsVolumeDataSource;
