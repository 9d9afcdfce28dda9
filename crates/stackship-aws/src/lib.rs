// stackship-aws - AWS SDK implementations of the stackship-core seams

use aws_config::{BehaviorVersion, Region, SdkConfig};
use stackship_config::AwsConfig;

mod cloudformation;
mod code_sync;
mod existing;

pub use cloudformation::CloudFormationStackApi;
pub use code_sync::{content_type_for, zip_directory, AwsCodeSync};
pub use existing::AwsExistingNames;

/// Shared SDK configuration for the configured region and optional profile
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(aws.region.clone()));
    if let Some(profile) = &aws.profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}
