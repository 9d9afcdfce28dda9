//! Names already in use in the account, for conflict checks.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::types::StackStatus;
use stackship_core::ExistingNames;
use tracing::debug;

pub struct AwsExistingNames {
    cloudformation: aws_sdk_cloudformation::Client,
    s3: aws_sdk_s3::Client,
    lambda: aws_sdk_lambda::Client,
}

impl AwsExistingNames {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
            lambda: aws_sdk_lambda::Client::new(config),
        }
    }

    async fn stack_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .cloudformation
                .list_stacks()
                .set_next_token(next_token.take())
                .send()
                .await
                .context("Failed to list CloudFormation stacks")?;

            names.extend(
                page.stack_summaries()
                    .iter()
                    .filter(|s| s.stack_status() != Some(&StackStatus::DeleteComplete))
                    .filter_map(|s| s.stack_name().map(str::to_string)),
            );

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    async fn bucket_names(&self) -> Result<Vec<String>> {
        let output = self
            .s3
            .list_buckets()
            .send()
            .await
            .context("Failed to list S3 buckets")?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn function_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let page = self
                .lambda
                .list_functions()
                .set_marker(marker.take())
                .send()
                .await
                .context("Failed to list Lambda functions")?;

            names.extend(
                page.functions()
                    .iter()
                    .filter_map(|f| f.function_name().map(str::to_string)),
            );

            match page.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl ExistingNames for AwsExistingNames {
    async fn existing_names(&self) -> Result<Vec<String>> {
        let mut names = self.stack_names().await?;
        let stacks = names.len();
        names.extend(self.bucket_names().await?);
        let buckets = names.len() - stacks;
        names.extend(self.function_names().await?);

        debug!(
            stacks,
            buckets,
            functions = names.len() - stacks - buckets,
            "Listed existing resource names"
        );
        Ok(names)
    }
}
