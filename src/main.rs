use anyhow::{Context, Result};
use clap::Parser;
use stackship::commands::Command;
use stackship_config::{DeploymentConfig, LogFormat};
use std::path::PathBuf;

/// Deploy simple web applications to AWS through CloudFormation
#[derive(Parser)]
#[command(name = "stackship")]
#[command(version)]
#[command(about = "Deploy simple web applications to AWS through CloudFormation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(config_path) = &cli.config {
        DeploymentConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        DeploymentConfig::load().context("Failed to load configuration")?
    };

    apply_cli_overrides(&mut config, &cli)?;
    stackship::init_tracing(&config.logging);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(cli.command.run(config))
}

fn apply_cli_overrides(config: &mut DeploymentConfig, cli: &Cli) -> Result<()> {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    if let Some(format) = &cli.log_format {
        config.logging.format = match format.to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => anyhow::bail!("Unknown --log-format '{}', expected text or json", other),
        };
    }

    Ok(())
}
