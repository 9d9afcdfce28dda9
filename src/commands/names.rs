//! `stackship names`

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use stackship_aws::{load_sdk_config, AwsExistingNames};
use stackship_config::DeploymentConfig;
use stackship_core::{check_naming_conflicts, generate_resource_names, ExistingNames};
use tracing::warn;

#[derive(Args)]
pub struct NamesArgs {
    /// Target environment
    #[arg(short, long)]
    pub env: String,

    /// Token used in the bucket name instead of the config hash
    #[arg(long, value_name = "KEY")]
    pub idempotency_key: Option<String>,

    /// Compare against stacks, buckets and functions in the AWS account
    #[arg(long)]
    pub check_conflicts: bool,
}

pub async fn run(args: NamesArgs, config: DeploymentConfig) -> Result<()> {
    let config = super::resolve(&config, &args.env)?;
    let uniqueness = super::bucket_uniqueness(args.idempotency_key.as_deref());
    let names = generate_resource_names(&config, Some(args.env.trim()), &uniqueness);

    let output = if args.check_conflicts {
        let sdk_config = load_sdk_config(&config.aws).await;
        let existing = AwsExistingNames::new(&sdk_config)
            .existing_names()
            .await
            .context("Failed to list existing resources")?;

        let conflicts = check_naming_conflicts(&names, &existing);
        for conflict in &conflicts {
            warn!(conflict = %conflict, "Name already in use (expected when redeploying)");
        }
        json!({ "names": names, "conflicts": conflicts })
    } else {
        json!({ "names": names })
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize names")?
    );
    Ok(())
}
