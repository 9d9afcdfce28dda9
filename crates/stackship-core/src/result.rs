//! Deployment outcome reported to callers.

use crate::error::DeployError;
use crate::naming::ResourceNames;
use crate::stack::{StackDescription, StackOperation};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const WEBSITE_URL_OUTPUT: &str = "WebsiteURL";
pub const FUNCTION_URL_OUTPUT: &str = "FunctionURL";
pub const BUCKET_NAME_OUTPUT: &str = "BucketName";
pub const FUNCTION_NAME_OUTPUT: &str = "FunctionName";

/// Error code carried by every failed deployment
pub const DEPLOYMENT_FAILED: &str = "DEPLOYMENT_FAILED";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub resources: Vec<DeployedResource>,
    pub endpoints: Vec<Endpoint>,
    pub errors: Vec<DeploymentError>,
    pub metadata: DeploymentMetadata,
}

impl DeploymentResult {
    pub fn succeeded(
        resources: Vec<DeployedResource>,
        endpoints: Vec<Endpoint>,
        metadata: DeploymentMetadata,
    ) -> Self {
        Self {
            success: true,
            resources,
            endpoints,
            errors: Vec::new(),
            metadata,
        }
    }

    pub fn failed(error: DeploymentError, metadata: DeploymentMetadata) -> Self {
        Self {
            success: false,
            resources: Vec::new(),
            endpoints: Vec::new(),
            errors: vec![error],
            metadata,
        }
    }

    pub fn endpoint(&self, kind: EndpointKind) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.kind == kind)
            .map(|e| e.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<StackOperation>,
    pub no_op: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub remediation: String,
}

impl From<&DeployError> for DeploymentError {
    fn from(error: &DeployError) -> Self {
        Self {
            code: DEPLOYMENT_FAILED.to_string(),
            message: error.to_string(),
            details: Some(format!("error_code={}", error.code())),
            remediation: error.hint().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Website,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    S3Bucket,
    LambdaFunction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedResource {
    pub kind: ResourceType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Typed endpoints for the well-known URL outputs
pub fn extract_endpoints(description: &StackDescription) -> Vec<Endpoint> {
    [
        (WEBSITE_URL_OUTPUT, EndpointKind::Website),
        (FUNCTION_URL_OUTPUT, EndpointKind::Function),
    ]
    .into_iter()
    .filter_map(|(key, kind)| {
        description.output(key).map(|url| Endpoint {
            kind,
            url: url.to_string(),
        })
    })
    .collect()
}

/// Best-effort records for the bucket and function, preferring stack
/// outputs and falling back to generated names.
pub fn extract_resources(
    description: &StackDescription,
    names: &ResourceNames,
) -> Vec<DeployedResource> {
    let mut resources = Vec::new();

    let bucket = description
        .output(BUCKET_NAME_OUTPUT)
        .map(str::to_string)
        .or_else(|| names.s3_bucket_name.clone());
    if let Some(name) = bucket {
        resources.push(DeployedResource {
            kind: ResourceType::S3Bucket,
            name,
            url: description.output(WEBSITE_URL_OUTPUT).map(str::to_string),
        });
    }

    let function = description
        .output(FUNCTION_NAME_OUTPUT)
        .map(str::to_string)
        .or_else(|| names.lambda_function_name.clone());
    if let Some(name) = function {
        resources.push(DeployedResource {
            kind: ResourceType::LambdaFunction,
            name,
            url: description.output(FUNCTION_URL_OUTPUT).map(str::to_string),
        });
    }

    resources
}
