//! CloudFormation control plane backed by the AWS SDK.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Parameter, Stack, Tag};
use aws_sdk_cloudformation::Client;
use stackship_core::{StackApi, StackApiError, StackDescription, StackOutput, StackRequest};
use std::fmt;
use tracing::debug;

const VALIDATION_ERROR: &str = "ValidationError";

pub struct CloudFormationStackApi {
    client: Client,
}

impl CloudFormationStackApi {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl StackApi for CloudFormationStackApi {
    async fn describe_stack(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackDescription>, StackApiError> {
        match self.client.describe_stacks().stack_name(stack_name).send().await {
            Ok(output) => Ok(output.stacks().first().map(to_description)),
            Err(e) => {
                let message = error_message(e.message(), DisplayErrorContext(&e));
                if is_missing_stack(e.code(), &message) {
                    debug!(stack_name, "Stack does not exist");
                    Ok(None)
                } else {
                    Err(StackApiError::api(message))
                }
            }
        }
    }

    async fn create_stack(&self, request: &StackRequest) -> Result<(), StackApiError> {
        self.client
            .create_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_parameters(Some(parameters(request)))
            .set_capabilities(Some(capabilities(request)))
            .set_tags(Some(tags(request)))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StackApiError::api(error_message(e.message(), DisplayErrorContext(&e))))
    }

    async fn update_stack(&self, request: &StackRequest) -> Result<(), StackApiError> {
        match self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .template_body(&request.template_body)
            .set_parameters(Some(parameters(request)))
            .set_capabilities(Some(capabilities(request)))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = error_message(e.message(), DisplayErrorContext(&e));
                if is_no_updates(e.code(), &message) {
                    Err(StackApiError::NoUpdates)
                } else {
                    Err(StackApiError::api(message))
                }
            }
        }
    }
}

fn parameters(request: &StackRequest) -> Vec<Parameter> {
    request
        .parameters
        .iter()
        .map(|p| {
            Parameter::builder()
                .parameter_key(&p.key)
                .parameter_value(&p.value)
                .build()
        })
        .collect()
}

fn tags(request: &StackRequest) -> Vec<Tag> {
    request
        .tags
        .iter()
        .map(|(key, value)| Tag::builder().key(key).value(value).build())
        .collect()
}

fn capabilities(request: &StackRequest) -> Vec<Capability> {
    request
        .capabilities
        .iter()
        .map(|c| Capability::from(c.as_str()))
        .collect()
}

fn to_description(stack: &Stack) -> StackDescription {
    StackDescription {
        name: stack.stack_name().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        status_reason: stack.stack_status_reason().map(str::to_string),
        outputs: stack
            .outputs()
            .iter()
            .filter_map(|o| {
                Some(StackOutput {
                    key: o.output_key()?.to_string(),
                    value: o.output_value()?.to_string(),
                })
            })
            .collect(),
    }
}

fn error_message(service_message: Option<&str>, context: impl fmt::Display) -> String {
    match service_message {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => context.to_string(),
    }
}

/// `DescribeStacks` reports a missing stack as a validation error
fn is_missing_stack(code: Option<&str>, message: &str) -> bool {
    code == Some(VALIDATION_ERROR) && message.contains("does not exist")
}

fn is_no_updates(code: Option<&str>, message: &str) -> bool {
    code == Some(VALIDATION_ERROR) && message.contains("No updates are to be performed")
}
