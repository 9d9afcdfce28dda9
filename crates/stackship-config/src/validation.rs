// Configuration validation
//
// Validates that values are within the ranges AWS accepts. Presence rules
// tied to the application type are checked by the orchestrator before a
// deployment starts.

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

/// CloudWatch Logs accepts only these retention periods
const LOG_RETENTION_DAYS: &[u32] = &[
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

pub fn validate_config(config: &DeploymentConfig) -> Result<()> {
    validate_aws_config(&config.aws)?;

    if let Some(ref frontend) = config.frontend {
        validate_frontend_config(frontend)?;
    }

    if let Some(ref backend) = config.backend {
        validate_backend_config(backend)?;
    }

    validate_deployment_settings(&config.deployment)?;

    Ok(())
}

fn validate_aws_config(config: &AwsConfig) -> Result<()> {
    if config.region.is_empty() {
        bail!("aws.region must not be empty");
    }

    // e.g. us-east-1, ap-southeast-2, us-gov-west-1
    let parts: Vec<&str> = config.region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
        && parts
            .last()
            .is_some_and(|p| p.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        bail!(
            "aws.region '{}' is not a valid region identifier (expected e.g. 'us-east-1')",
            config.region
        );
    }

    if let Some(ref account_id) = config.account_id {
        if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
            bail!("aws.account_id must be a 12-digit AWS account number");
        }
    }

    Ok(())
}

fn validate_frontend_config(config: &FrontendConfig) -> Result<()> {
    if config.source_dir.trim().is_empty() {
        bail!("frontend.source_dir must not be empty");
    }

    if config.index_document.trim().is_empty() {
        bail!("frontend.index_document must not be empty");
    }

    Ok(())
}

fn validate_backend_config(config: &BackendConfig) -> Result<()> {
    if config.source_dir.trim().is_empty() {
        bail!("backend.source_dir must not be empty");
    }

    if config.handler.trim().is_empty() {
        bail!("backend.handler must not be empty");
    }

    // Placeholder code embedded in the template exists only for these
    if !(config.runtime.starts_with("nodejs") || config.runtime.starts_with("python")) {
        bail!(
            "backend.runtime '{}' is not supported (expected a nodejs* or python* runtime)",
            config.runtime
        );
    }

    if !(128..=10_240).contains(&config.memory_size) {
        bail!(
            "backend.memory_size must be between 128 and 10240 MB, got {}",
            config.memory_size
        );
    }

    if !(1..=900).contains(&config.timeout) {
        bail!(
            "backend.timeout must be between 1 and 900 seconds, got {}",
            config.timeout
        );
    }

    Ok(())
}

fn validate_deployment_settings(config: &DeploymentSettings) -> Result<()> {
    if config.poll_interval_secs == 0 {
        bail!("deployment.poll_interval_secs must be greater than 0");
    }

    if config.max_wait_secs < config.poll_interval_secs {
        bail!(
            "deployment.max_wait_secs ({}) must be at least deployment.poll_interval_secs ({})",
            config.max_wait_secs,
            config.poll_interval_secs
        );
    }

    if !LOG_RETENTION_DAYS.contains(&config.log_retention_days) {
        bail!(
            "deployment.log_retention_days {} is not a CloudWatch retention period",
            config.log_retention_days
        );
    }

    if let Some(ref stack_name) = config.stack_name {
        if stack_name.len() > 128 {
            bail!("deployment.stack_name must be at most 128 characters");
        }
        if !stack_name.starts_with(|c: char| c.is_ascii_alphabetic())
            || !stack_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            bail!(
                "deployment.stack_name '{}' must start with a letter and contain only letters, digits and hyphens",
                stack_name
            );
        }
    }

    // Warn about waits longer than CloudFormation itself usually takes
    if config.max_wait_secs > 2 * 60 * 60 {
        warn!(
            max_wait_secs = config.max_wait_secs,
            "deployment.max_wait_secs is very large; a stuck stack will block for a long time"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn backend() -> BackendConfig {
        BackendConfig {
            source_dir: "./src".to_string(),
            handler: "index.handler".to_string(),
            runtime: "nodejs20.x".to_string(),
            memory_size: 256,
            timeout: 30,
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn test_validate_aws_config() {
        assert!(validate_aws_config(&AwsConfig::default()).is_ok());

        let gov = AwsConfig {
            region: "us-gov-west-1".to_string(),
            ..AwsConfig::default()
        };
        assert!(validate_aws_config(&gov).is_ok());

        let bad = AwsConfig {
            region: "Virginia".to_string(),
            ..AwsConfig::default()
        };
        assert!(validate_aws_config(&bad).is_err());

        let bad_account = AwsConfig {
            account_id: Some("1234".to_string()),
            ..AwsConfig::default()
        };
        assert!(validate_aws_config(&bad_account).is_err());
    }

    #[test]
    fn test_validate_backend_config() {
        assert!(validate_backend_config(&backend()).is_ok());

        let too_small = BackendConfig {
            memory_size: 64,
            ..backend()
        };
        assert!(validate_backend_config(&too_small).is_err());

        let too_slow = BackendConfig {
            timeout: 901,
            ..backend()
        };
        assert!(validate_backend_config(&too_slow).is_err());

        let no_handler = BackendConfig {
            handler: " ".to_string(),
            ..backend()
        };
        assert!(validate_backend_config(&no_handler).is_err());

        let python = BackendConfig {
            runtime: "python3.12".to_string(),
            ..backend()
        };
        assert!(validate_backend_config(&python).is_ok());

        let java = BackendConfig {
            runtime: "java21".to_string(),
            ..backend()
        };
        assert!(validate_backend_config(&java).is_err());
    }

    #[test]
    fn test_validate_deployment_settings() {
        assert!(validate_deployment_settings(&DeploymentSettings::default()).is_ok());

        let zero_interval = DeploymentSettings {
            poll_interval_secs: 0,
            ..DeploymentSettings::default()
        };
        assert!(validate_deployment_settings(&zero_interval).is_err());

        let short_wait = DeploymentSettings {
            max_wait_secs: 5,
            poll_interval_secs: 10,
            ..DeploymentSettings::default()
        };
        assert!(validate_deployment_settings(&short_wait).is_err());

        let odd_retention = DeploymentSettings {
            log_retention_days: 10,
            ..DeploymentSettings::default()
        };
        assert!(validate_deployment_settings(&odd_retention).is_err());

        let bad_stack = DeploymentSettings {
            stack_name: Some("1-stack".to_string()),
            ..DeploymentSettings::default()
        };
        assert!(validate_deployment_settings(&bad_stack).is_err());

        let underscored = DeploymentSettings {
            stack_name: Some("custom_stack".to_string()),
            ..DeploymentSettings::default()
        };
        let err = validate_deployment_settings(&underscored).unwrap_err();
        assert!(err.to_string().contains("custom_stack"));

        let explicit = DeploymentSettings {
            stack_name: Some("custom-stack".to_string()),
            ..DeploymentSettings::default()
        };
        assert!(validate_deployment_settings(&explicit).is_ok());
    }
}
