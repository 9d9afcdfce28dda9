//! `stackship template`

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::Confirm;
use stackship_config::DeploymentConfig;
use stackship_core::{generate_resource_names, generate_template, validate_template};
use std::fs;
use std::path::PathBuf;

#[derive(Args)]
pub struct TemplateArgs {
    /// Target environment
    #[arg(short, long)]
    pub env: String,

    /// Token used in the bucket name instead of the config hash
    #[arg(long, value_name = "KEY")]
    pub idempotency_key: Option<String>,

    /// Write the template to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Overwrite existing file without asking
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: TemplateArgs, config: DeploymentConfig) -> Result<()> {
    let environment = args.env.trim();
    let config = super::resolve(&config, environment)?;
    let uniqueness = super::bucket_uniqueness(args.idempotency_key.as_deref());
    let names = generate_resource_names(&config, Some(environment), &uniqueness);

    let template = generate_template(&config, &names, environment);
    validate_template(&template, config.application.app_type)?;
    let rendered =
        serde_json::to_string_pretty(&template).context("Failed to serialize template")?;

    let Some(output_path) = args.output else {
        println!("{}", rendered);
        return Ok(());
    };

    if output_path.exists() && !args.force {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "{} already exists. Overwrite?",
                output_path.display()
            ))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    fs::write(&output_path, rendered + "\n")
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    println!("Wrote {}", output_path.display());
    Ok(())
}
