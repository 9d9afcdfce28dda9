//! CloudFormation template generation and shape validation.

use crate::naming::ResourceNames;
use serde_json::{json, Map, Value};
use stackship_config::{ApplicationType, DeploymentConfig};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// CloudFormation limit for an inline `TemplateBody`
pub const MAX_TEMPLATE_BODY_BYTES: usize = 51_200;

const MAX_LOGICAL_ID_LEN: usize = 255;
const LOGICAL_ID_BASE_LEN: usize = 200;

const PSEUDO_PARAMETERS: &[&str] = &[
    "AWS::AccountId",
    "AWS::NotificationARNs",
    "AWS::NoValue",
    "AWS::Partition",
    "AWS::Region",
    "AWS::StackId",
    "AWS::StackName",
    "AWS::URLSuffix",
];

const BASIC_EXECUTION_POLICY: &str = ":iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template must be a JSON object")]
    NotAnObject,

    #[error("AWSTemplateFormatVersion must be '2010-09-09'")]
    MissingFormatVersion,

    #[error("Description must be a string")]
    MissingDescription,

    #[error("parameter '{0}' is not declared")]
    MissingParameter(String),

    #[error("template declares no resources")]
    NoResources,

    #[error("logical ID '{0}' must be 1-255 alphanumeric characters")]
    InvalidLogicalId(String),

    #[error("resource '{0}' has no AWS:: Type")]
    MissingResourceType(String),

    #[error("'{from}' references undeclared '{target}'")]
    UnknownReference { from: String, target: String },

    #[error("output '{0}' is required for this application type")]
    MissingOutput(String),

    #[error("template body is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("template could not be serialized: {0}")]
    Serialization(String),
}

/// Logical IDs for one application's resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalIds {
    pub bucket: String,
    pub bucket_policy: String,
    pub role: String,
    pub log_group: String,
    pub function: String,
    pub function_url: String,
    pub function_url_permission: String,
    pub function_invoke_permission: String,
    pub error_alarm: String,
}

impl LogicalIds {
    pub fn for_application(name: &str) -> Self {
        let base = logical_id_base(name);
        let id = |suffix: &str| format!("{}{}", base, suffix);
        Self {
            bucket: id("FrontendBucket"),
            bucket_policy: id("FrontendBucketPolicy"),
            role: id("LambdaRole"),
            log_group: id("LogGroup"),
            function: id("Function"),
            function_url: id("FunctionUrl"),
            function_url_permission: id("FunctionUrlPermission"),
            function_invoke_permission: id("FunctionInvokePermission"),
            error_alarm: id("FunctionErrorAlarm"),
        }
    }
}

/// PascalCase alphanumeric form of an application name, e.g. `my-app` -> `MyApp`
pub fn logical_id_base(name: &str) -> String {
    let mut base = String::new();
    for word in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            base.push(first.to_ascii_uppercase());
            base.extend(chars);
        }
    }

    if !base.starts_with(|c: char| c.is_ascii_alphabetic()) {
        base.insert_str(0, "App");
    }
    base.truncate(LOGICAL_ID_BASE_LEN);
    base
}

/// Build the stack template for an application.
///
/// Frontend types get a website bucket with a public-read policy; backend
/// types get an execution role, log group, placeholder function and a public
/// Function URL. Placeholder code is replaced by code sync after the stack
/// settles.
pub fn generate_template(
    config: &DeploymentConfig,
    names: &ResourceNames,
    environment: &str,
) -> Value {
    let app_type = config.application.app_type;
    let ids = LogicalIds::for_application(&config.application.name);
    let tags = resource_tags(config, environment);

    let mut resources = Map::new();
    let mut outputs = Map::new();

    if app_type.requires_frontend() {
        add_frontend(config, names, &ids, &tags, &mut resources, &mut outputs);
    }
    if app_type.requires_backend() {
        add_backend(config, names, &ids, &tags, &mut resources, &mut outputs);
    }

    json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": format!(
            "stackship {} deployment of {} ({})",
            app_type, config.application.name, environment
        ),
        "Parameters": {
            "ApplicationName": {
                "Type": "String",
                "Default": config.application.name,
                "Description": "Application name"
            },
            "Environment": {
                "Type": "String",
                "Default": environment,
                "Description": "Deployment environment"
            }
        },
        "Resources": resources,
        "Outputs": outputs
    })
}

fn resource_tags(config: &DeploymentConfig, environment: &str) -> Value {
    let mut tags: BTreeMap<&str, &str> = config
        .deployment
        .tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    tags.insert("Application", &config.application.name);
    tags.insert("Environment", environment);
    tags.insert("ManagedBy", "stackship");

    Value::Array(
        tags.into_iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect(),
    )
}

fn add_frontend(
    config: &DeploymentConfig,
    names: &ResourceNames,
    ids: &LogicalIds,
    tags: &Value,
    resources: &mut Map<String, Value>,
    outputs: &mut Map<String, Value>,
) {
    let (index_document, error_document) = match &config.frontend {
        Some(frontend) => (
            frontend.index_document.as_str(),
            frontend.error_document.as_str(),
        ),
        None => ("index.html", "error.html"),
    };

    let mut bucket_properties = json!({
        "WebsiteConfiguration": {
            "IndexDocument": index_document,
            "ErrorDocument": error_document
        },
        "PublicAccessBlockConfiguration": {
            "BlockPublicAcls": false,
            "BlockPublicPolicy": false,
            "IgnorePublicAcls": false,
            "RestrictPublicBuckets": false
        },
        "Tags": tags
    });
    if let Some(bucket_name) = &names.s3_bucket_name {
        bucket_properties["BucketName"] = json!(bucket_name);
    }

    resources.insert(
        ids.bucket.clone(),
        json!({ "Type": "AWS::S3::Bucket", "Properties": bucket_properties }),
    );
    resources.insert(
        ids.bucket_policy.clone(),
        json!({
            "Type": "AWS::S3::BucketPolicy",
            "Properties": {
                "Bucket": { "Ref": ids.bucket },
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": "PublicReadGetObject",
                        "Effect": "Allow",
                        "Principal": "*",
                        "Action": "s3:GetObject",
                        "Resource": {
                            "Fn::Join": ["", [{ "Fn::GetAtt": [ids.bucket, "Arn"] }, "/*"]]
                        }
                    }]
                }
            }
        }),
    );

    outputs.insert(
        "WebsiteURL".to_string(),
        json!({
            "Description": "Static website endpoint",
            "Value": { "Fn::GetAtt": [ids.bucket, "WebsiteURL"] }
        }),
    );
    outputs.insert(
        "BucketName".to_string(),
        json!({
            "Description": "Frontend asset bucket",
            "Value": { "Ref": ids.bucket }
        }),
    );
}

fn add_backend(
    config: &DeploymentConfig,
    names: &ResourceNames,
    ids: &LogicalIds,
    tags: &Value,
    resources: &mut Map<String, Value>,
    outputs: &mut Map<String, Value>,
) {
    let (handler, runtime, memory_size, timeout) = match &config.backend {
        Some(backend) => (
            backend.handler.as_str(),
            backend.runtime.as_str(),
            backend.memory_size,
            backend.timeout,
        ),
        None => ("index.handler", "nodejs20.x", 128, 30),
    };

    let mut role_properties = json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole"
            }]
        },
        "ManagedPolicyArns": [{
            "Fn::Join": ["", ["arn:", { "Ref": "AWS::Partition" }, BASIC_EXECUTION_POLICY]]
        }],
        "Tags": tags
    });
    if let Some(role_name) = &names.lambda_execution_role_name {
        role_properties["RoleName"] = json!(role_name);
    }
    resources.insert(
        ids.role.clone(),
        json!({ "Type": "AWS::IAM::Role", "Properties": role_properties }),
    );

    let mut log_group_properties = json!({
        "RetentionInDays": config.deployment.log_retention_days
    });
    if let Some(log_group_name) = &names.log_group_name {
        log_group_properties["LogGroupName"] = json!(log_group_name);
    }
    resources.insert(
        ids.log_group.clone(),
        json!({ "Type": "AWS::Logs::LogGroup", "Properties": log_group_properties }),
    );

    let mut function_properties = json!({
        "Runtime": runtime,
        "Handler": handler,
        "MemorySize": memory_size,
        "Timeout": timeout,
        "Role": { "Fn::GetAtt": [ids.role, "Arn"] },
        "Code": { "ZipFile": placeholder_code(runtime) },
        "Tags": tags
    });
    if let Some(function_name) = &names.lambda_function_name {
        function_properties["FunctionName"] = json!(function_name);
    }
    if let Some(backend) = config.backend.as_ref().filter(|b| !b.environment.is_empty()) {
        function_properties["Environment"] = json!({ "Variables": backend.environment });
    }
    resources.insert(
        ids.function.clone(),
        json!({
            "Type": "AWS::Lambda::Function",
            "DependsOn": [ids.log_group],
            "Properties": function_properties
        }),
    );

    resources.insert(
        ids.function_url.clone(),
        json!({
            "Type": "AWS::Lambda::Url",
            "Properties": {
                "TargetFunctionArn": { "Fn::GetAtt": [ids.function, "Arn"] },
                "AuthType": "NONE",
                "Cors": {
                    "AllowOrigins": ["*"],
                    "AllowMethods": ["*"],
                    "AllowHeaders": ["*"]
                }
            }
        }),
    );
    resources.insert(
        ids.function_url_permission.clone(),
        json!({
            "Type": "AWS::Lambda::Permission",
            "Properties": {
                "Action": "lambda:InvokeFunctionUrl",
                "FunctionName": { "Ref": ids.function },
                "Principal": "*",
                "FunctionUrlAuthType": "NONE"
            }
        }),
    );
    // Public URLs also need InvokeFunction, scoped to calls through the URL
    resources.insert(
        ids.function_invoke_permission.clone(),
        json!({
            "Type": "AWS::Lambda::Permission",
            "Properties": {
                "Action": "lambda:InvokeFunction",
                "FunctionName": { "Ref": ids.function },
                "Principal": "*",
                "InvokedViaFunctionUrl": true
            }
        }),
    );

    if config.deployment.monitoring {
        resources.insert(
            ids.error_alarm.clone(),
            json!({
                "Type": "AWS::CloudWatch::Alarm",
                "Properties": {
                    "AlarmDescription": format!(
                        "Errors reported by {}",
                        config.application.name
                    ),
                    "Namespace": "AWS/Lambda",
                    "MetricName": "Errors",
                    "Dimensions": [{ "Name": "FunctionName", "Value": { "Ref": ids.function } }],
                    "Statistic": "Sum",
                    "Period": 300,
                    "EvaluationPeriods": 1,
                    "Threshold": 1,
                    "ComparisonOperator": "GreaterThanOrEqualToThreshold",
                    "TreatMissingData": "notBreaching"
                }
            }),
        );
    }

    outputs.insert(
        "FunctionURL".to_string(),
        json!({
            "Description": "Public Function URL",
            "Value": { "Fn::GetAtt": [ids.function_url, "FunctionUrl"] }
        }),
    );
    outputs.insert(
        "FunctionName".to_string(),
        json!({
            "Description": "Backend Lambda function",
            "Value": { "Ref": ids.function }
        }),
    );
}

fn placeholder_code(runtime: &str) -> &'static str {
    if runtime.starts_with("python") {
        "def handler(event, context):\n    return {'statusCode': 503, 'body': 'Deployment in progress'}\n"
    } else {
        "exports.handler = async () => ({ statusCode: 503, body: 'Deployment in progress' });\n"
    }
}

/// Serialized form submitted as `TemplateBody`
pub fn template_body(template: &Value) -> Result<String, TemplateError> {
    serde_json::to_string(template).map_err(|e| TemplateError::Serialization(e.to_string()))
}

/// Check the structural rules CloudFormation would otherwise reject late.
pub fn validate_template(template: &Value, app_type: ApplicationType) -> Result<(), TemplateError> {
    let root = template.as_object().ok_or(TemplateError::NotAnObject)?;

    if root.get("AWSTemplateFormatVersion").and_then(Value::as_str)
        != Some(TEMPLATE_FORMAT_VERSION)
    {
        return Err(TemplateError::MissingFormatVersion);
    }

    if !root.get("Description").is_some_and(Value::is_string) {
        return Err(TemplateError::MissingDescription);
    }

    let empty = Map::new();
    let parameters = root
        .get("Parameters")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    for required in ["ApplicationName", "Environment"] {
        if !parameters.contains_key(required) {
            return Err(TemplateError::MissingParameter(required.to_string()));
        }
    }

    let resources = match root.get("Resources").and_then(Value::as_object) {
        Some(resources) if !resources.is_empty() => resources,
        _ => return Err(TemplateError::NoResources),
    };

    for (logical_id, resource) in resources {
        if logical_id.is_empty()
            || logical_id.len() > MAX_LOGICAL_ID_LEN
            || !logical_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(TemplateError::InvalidLogicalId(logical_id.clone()));
        }
        let has_type = resource
            .get("Type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.starts_with("AWS::"));
        if !has_type {
            return Err(TemplateError::MissingResourceType(logical_id.clone()));
        }
    }

    let outputs = root
        .get("Outputs")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let declared: HashSet<&str> = parameters
        .keys()
        .chain(resources.keys())
        .map(String::as_str)
        .chain(PSEUDO_PARAMETERS.iter().copied())
        .collect();
    let resource_ids: HashSet<&str> = resources.keys().map(String::as_str).collect();

    for (from, value) in resources.iter().chain(outputs.iter()) {
        check_references(from, value, &declared, &resource_ids)?;
    }

    let mut required_outputs = Vec::new();
    if app_type.requires_frontend() {
        required_outputs.extend(["WebsiteURL", "BucketName"]);
    }
    if app_type.requires_backend() {
        required_outputs.extend(["FunctionURL", "FunctionName"]);
    }
    for output in required_outputs {
        if !outputs.contains_key(output) {
            return Err(TemplateError::MissingOutput(output.to_string()));
        }
    }

    let size = template_body(template)?.len();
    if size > MAX_TEMPLATE_BODY_BYTES {
        return Err(TemplateError::TooLarge {
            size,
            limit: MAX_TEMPLATE_BODY_BYTES,
        });
    }

    Ok(())
}

fn check_references(
    from: &str,
    value: &Value,
    declared: &HashSet<&str>,
    resource_ids: &HashSet<&str>,
) -> Result<(), TemplateError> {
    let unknown = |target: &str| TemplateError::UnknownReference {
        from: from.to_string(),
        target: target.to_string(),
    };

    match value {
        Value::Object(map) => {
            if let Some(target) = map.get("Ref").and_then(Value::as_str) {
                if !declared.contains(target) {
                    return Err(unknown(target));
                }
            }
            if let Some(get_att) = map.get("Fn::GetAtt") {
                let target = match get_att {
                    Value::Array(parts) => parts.first().and_then(Value::as_str),
                    Value::String(dotted) => dotted.split('.').next(),
                    _ => None,
                };
                match target {
                    Some(target) if resource_ids.contains(target) => {}
                    Some(target) => return Err(unknown(target)),
                    None => return Err(unknown("<malformed Fn::GetAtt>")),
                }
            }
            for nested in map.values() {
                check_references(from, nested, declared, resource_ids)?;
            }
        }
        Value::Array(items) => {
            for nested in items {
                check_references(from, nested, declared, resource_ids)?;
            }
        }
        _ => {}
    }

    Ok(())
}
