//! `stackship deploy`

use anyhow::{bail, Context, Result};
use clap::Args;
use stackship_aws::{load_sdk_config, AwsCodeSync, CloudFormationStackApi};
use stackship_config::DeploymentConfig;
use stackship_core::{validate_for_deployment, DeployOptions, DeploymentOrchestrator};
use tracing::info;

#[derive(Args)]
pub struct DeployArgs {
    /// Target environment, e.g. dev, staging, production
    #[arg(short, long)]
    pub env: String,

    /// Token that keeps the bucket name stable across runs (e.g. a CI run ID)
    #[arg(long, value_name = "KEY")]
    pub idempotency_key: Option<String>,

    /// Maximum seconds to wait for the stack (overrides config file)
    #[arg(long, value_name = "SECS")]
    pub max_wait: Option<u64>,
}

pub async fn run(args: DeployArgs, config: DeploymentConfig) -> Result<()> {
    let mut config = super::resolve(&config, &args.env)?;
    if let Some(max_wait) = args.max_wait {
        config.deployment.max_wait_secs = max_wait;
        config
            .validate()
            .context("Invalid --max-wait for the configured poll interval")?;
    }

    // Fail before credentials are resolved
    validate_for_deployment(&config)?;

    let sdk_config = load_sdk_config(&config.aws).await;
    info!(
        region = %config.aws.region,
        profile = config.aws.profile.as_deref().unwrap_or("default"),
        "Loaded AWS configuration"
    );

    let orchestrator = DeploymentOrchestrator::new(
        CloudFormationStackApi::new(&sdk_config),
        AwsCodeSync::new(&sdk_config),
    )
    .with_options(DeployOptions {
        bucket_uniqueness: super::bucket_uniqueness(args.idempotency_key.as_deref()),
    });

    let result = orchestrator.deploy(&config, args.env.trim()).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize deployment result")?
    );

    if !result.success {
        let reason = result
            .errors
            .first()
            .map(|e| e.message.as_str())
            .unwrap_or("unknown error");
        bail!("Deployment failed: {}", reason);
    }
    Ok(())
}
