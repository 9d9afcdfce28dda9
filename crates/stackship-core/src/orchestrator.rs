//! End-to-end deployment of one application to one environment.

use crate::collaborators::{AlwaysProceed, CodeSync, DeployPrecondition};
use crate::error::{DeployError, Result};
use crate::naming::{generate_resource_names, BucketUniqueness, ResourceNames};
use crate::result::{
    extract_endpoints, extract_resources, DeploymentError, DeploymentMetadata, DeploymentResult,
    BUCKET_NAME_OUTPUT, FUNCTION_NAME_OUTPUT,
};
use crate::stack::{PollSettings, StackApi, StackDriver, StackOperation, StackOutcome, StackSubmission};
use crate::template::{generate_template, template_body, validate_template};
use chrono::Utc;
use stackship_config::DeploymentConfig;
use std::path::Path;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub bucket_uniqueness: BucketUniqueness,
}

/// Check the fields a deployment of this application type depends on.
///
/// Runs before any AWS call. Range checks from the configuration crate are
/// applied too, since callers may build a config without loading a file.
pub fn validate_for_deployment(config: &DeploymentConfig) -> Result<()> {
    if config.application.name.trim().is_empty() {
        return Err(DeployError::InvalidConfig(
            "application.name is required".to_string(),
        ));
    }

    let app_type = config.application.app_type;
    match (app_type.requires_frontend(), config.frontend.is_some()) {
        (true, false) => {
            return Err(DeployError::InvalidConfig(format!(
                "frontend configuration is required for {} applications",
                app_type
            )))
        }
        (false, true) => {
            return Err(DeployError::InvalidConfig(format!(
                "frontend configuration is not allowed for {} applications",
                app_type
            )))
        }
        _ => {}
    }
    match (app_type.requires_backend(), config.backend.is_some()) {
        (true, false) => {
            return Err(DeployError::InvalidConfig(format!(
                "backend configuration is required for {} applications",
                app_type
            )))
        }
        (false, true) => {
            return Err(DeployError::InvalidConfig(format!(
                "backend configuration is not allowed for {} applications",
                app_type
            )))
        }
        _ => {}
    }

    config
        .validate()
        .map_err(|e| DeployError::InvalidConfig(format!("{:#}", e)))
}

/// Runs validation, naming, templating, the stack lifecycle and code sync,
/// folding every failure into a [`DeploymentResult`].
pub struct DeploymentOrchestrator<A, S, P = AlwaysProceed> {
    driver: StackDriver<A>,
    code_sync: S,
    precondition: P,
    options: DeployOptions,
}

impl<A: StackApi, S: CodeSync> DeploymentOrchestrator<A, S> {
    pub fn new(stack_api: A, code_sync: S) -> Self {
        Self {
            driver: StackDriver::new(stack_api),
            code_sync,
            precondition: AlwaysProceed,
            options: DeployOptions::default(),
        }
    }
}

impl<A: StackApi, S: CodeSync, P: DeployPrecondition> DeploymentOrchestrator<A, S, P> {
    pub fn with_precondition<Q: DeployPrecondition>(
        self,
        precondition: Q,
    ) -> DeploymentOrchestrator<A, S, Q> {
        DeploymentOrchestrator {
            driver: self.driver,
            code_sync: self.code_sync,
            precondition,
            options: self.options,
        }
    }

    pub fn with_options(mut self, options: DeployOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stack_api(&self) -> &A {
        self.driver.api()
    }

    /// Deploy `config` as `environment`. Never fails: errors are reported in
    /// the returned result.
    pub async fn deploy(&self, config: &DeploymentConfig, environment: &str) -> DeploymentResult {
        let started = Instant::now();
        let mut metadata = DeploymentMetadata {
            stack_name: None,
            environment: environment.to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            operation: None,
            no_op: false,
        };

        info!(
            application = %config.application.name,
            app_type = %config.application.app_type,
            environment,
            "Starting deployment"
        );

        let outcome = self.run(config, environment, &mut metadata).await;
        metadata.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok((names, stack)) => {
                let endpoints = extract_endpoints(&stack.description);
                let resources = extract_resources(&stack.description, &names);
                metadata.operation = Some(stack.operation);
                metadata.no_op = stack.operation == StackOperation::NoOp;

                info!(
                    stack_name = %names.stack_name,
                    duration_ms = metadata.duration_ms,
                    endpoints = endpoints.len(),
                    "Deployment complete"
                );
                DeploymentResult::succeeded(resources, endpoints, metadata)
            }
            Err(e) => {
                error!(code = %e.code(), error = %e, "Deployment failed");
                DeploymentResult::failed(DeploymentError::from(&e), metadata)
            }
        }
    }

    async fn run(
        &self,
        config: &DeploymentConfig,
        environment: &str,
        metadata: &mut DeploymentMetadata,
    ) -> Result<(ResourceNames, StackOutcome)> {
        validate_for_deployment(config)?;

        let names =
            generate_resource_names(config, Some(environment), &self.options.bucket_uniqueness);
        metadata.stack_name = Some(names.stack_name.clone());

        let template = generate_template(config, &names, environment);
        validate_template(&template, config.application.app_type)?;
        let submission = StackSubmission {
            stack_name: names.stack_name.clone(),
            template_body: template_body(&template)?,
            application_name: config.application.name.clone(),
            tags: config.deployment.tags.clone(),
        };

        self.precondition
            .acquire(&names.stack_name)
            .await
            .map_err(|e| DeployError::Precondition {
                stack_name: names.stack_name.clone(),
                message: format!("{:#}", e),
            })?;

        let outcome = self.provision(config, &names, &submission).await;

        if let Err(e) = self.precondition.release(&names.stack_name).await {
            warn!(stack_name = %names.stack_name, error = %e, "Failed to release deployment precondition");
        }

        outcome.map(|stack| (names, stack))
    }

    async fn provision(
        &self,
        config: &DeploymentConfig,
        names: &ResourceNames,
        submission: &StackSubmission,
    ) -> Result<StackOutcome> {
        let poll = PollSettings::from(&config.deployment);
        let stack = self.driver.deploy(submission, &poll).await?;
        info!(
            stack_name = %names.stack_name,
            operation = ?stack.operation,
            status = %stack.description.status,
            "Infrastructure ready"
        );

        if let Some(frontend) = &config.frontend {
            let bucket = output_or_generated(&stack, BUCKET_NAME_OUTPUT, &names.s3_bucket_name)?;
            info!(bucket = %bucket, source_dir = %frontend.source_dir, "Uploading frontend assets");
            self.code_sync
                .sync_frontend(&bucket, Path::new(&frontend.source_dir))
                .await
                .map_err(|e| DeployError::code_sync(format!("s3://{}", bucket), e))?;
        }

        if let Some(backend) = &config.backend {
            let function =
                output_or_generated(&stack, FUNCTION_NAME_OUTPUT, &names.lambda_function_name)?;
            info!(function = %function, source_dir = %backend.source_dir, "Updating function code");
            self.code_sync
                .update_function_code(&function, Path::new(&backend.source_dir))
                .await
                .map_err(|e| DeployError::code_sync(format!("lambda:{}", function), e))?;
        }

        Ok(stack)
    }
}

fn output_or_generated(
    stack: &StackOutcome,
    output_key: &str,
    generated: &Option<String>,
) -> Result<String> {
    if let Some(value) = stack.description.output(output_key) {
        return Ok(value.to_string());
    }

    match generated {
        Some(name) => {
            warn!(
                output = output_key,
                name = %name,
                "Stack output missing; using generated name"
            );
            Ok(name.clone())
        }
        None => Err(DeployError::CodeSync {
            target: output_key.to_string(),
            message: "stack has no such output and no name was generated".to_string(),
        }),
    }
}
