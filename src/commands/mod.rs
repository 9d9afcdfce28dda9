// CLI subcommands
//
// Each command resolves the loaded configuration for one environment before
// doing its work.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use stackship_config::DeploymentConfig;
use stackship_core::{merge_environment_overrides, resolve_environment_config, BucketUniqueness};

pub mod deploy;
pub mod names;
pub mod template;

#[derive(Subcommand)]
pub enum Command {
    /// Provision infrastructure and upload application code
    Deploy(deploy::DeployArgs),
    /// Print the resource names a deployment would use
    Names(names::NamesArgs),
    /// Render the CloudFormation template for an environment
    Template(template::TemplateArgs),
}

impl Command {
    pub async fn run(self, config: DeploymentConfig) -> Result<()> {
        match self {
            Command::Deploy(args) => deploy::run(args, config).await,
            Command::Names(args) => names::run(args, config).await,
            Command::Template(args) => template::run(args, config),
        }
    }
}

/// Base configuration with the environment's overrides and tags applied
pub(crate) fn resolve(config: &DeploymentConfig, environment: &str) -> Result<DeploymentConfig> {
    let environment = environment.trim();
    if environment.is_empty() {
        bail!("--env must not be empty");
    }

    // Env vars outrank the file, including its per-environment table
    let mut layered =
        merge_environment_overrides(config, environment, config.environment_overrides(environment))?;
    layered.apply_env()?;

    let mut resolved = resolve_environment_config(&layered, environment, None)?;
    resolved.normalize();
    resolved
        .validate()
        .with_context(|| format!("Invalid configuration for environment '{}'", environment))?;
    Ok(resolved)
}

pub(crate) fn bucket_uniqueness(idempotency_key: Option<&str>) -> BucketUniqueness {
    match idempotency_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => BucketUniqueness::IdempotencyKey(key.to_string()),
        None => BucketUniqueness::ConfigHash,
    }
}
