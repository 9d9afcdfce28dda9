// stackship-core - Resource naming and CloudFormation deployment orchestration
//
// Components, leaf first:
// - naming: AWS-compliant, length-limited resource names
// - template: CloudFormation template generation and validation
// - stack: create/update/poll state machine over a StackApi
// - orchestrator: validation through code sync, reported as a DeploymentResult

mod collaborators;
mod error;
pub mod naming;
mod orchestrator;
mod result;
pub mod stack;
pub mod template;

pub use collaborators::{AlwaysProceed, CodeSync, DeployPrecondition, ExistingNames};
pub use error::{DeployError, ErrorCode, Result};
pub use naming::{
    check_naming_conflicts, generate_resource_names, merge_environment_overrides,
    resolve_environment_config,
    BucketUniqueness, NamingConfig, ResourceKind, ResourceNames,
};
pub use orchestrator::{validate_for_deployment, DeployOptions, DeploymentOrchestrator};
pub use result::{
    extract_endpoints, extract_resources, DeployedResource, DeploymentError, DeploymentMetadata,
    DeploymentResult, Endpoint, EndpointKind, ResourceType, DEPLOYMENT_FAILED,
};
pub use stack::{
    Capability, PollSettings, StackApi, StackApiError, StackDescription, StackDriver,
    StackOperation, StackOutcome, StackOutput, StackParameter, StackRequest, StackState,
    StackSubmission,
};
pub use template::{generate_template, validate_template, TemplateError};

// Re-export config types so adapters and the CLI need a single import
pub use stackship_config::{ApplicationType, DeploymentConfig};
