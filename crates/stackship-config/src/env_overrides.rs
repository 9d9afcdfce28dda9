use super::{ApplicationType, DeploymentConfig, LogFormat};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "STACKSHIP_";

/// Abstraction over environment-variable lookups so tests can supply
/// their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the STACKSHIP_ prefix
    /// Used for AWS standard variables (AWS_REGION, AWS_PROFILE)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the deployment config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut DeploymentConfig, env: &E) -> Result<()> {
    // Application
    if let Some(name) = get_env_string(env, "APP_NAME")? {
        config.application.name = name;
    }
    if let Some(app_type) = get_env_string(env, "APP_TYPE")? {
        config.application.app_type = app_type
            .parse::<ApplicationType>()
            .context("Invalid STACKSHIP_APP_TYPE value")?;
    }
    if let Some(version) = get_env_string(env, "APP_VERSION")? {
        config.application.version = version;
    }

    // AWS: standard variables first, prefixed variables win
    if let Some(region) = get_raw_env_string(env, "AWS_REGION")? {
        config.aws.region = region;
    }
    if let Some(region) = get_env_string(env, "AWS_REGION")? {
        config.aws.region = region;
    }
    if let Some(profile) = get_raw_env_string(env, "AWS_PROFILE")? {
        config.aws.profile = Some(profile);
    }
    if let Some(profile) = get_env_string(env, "AWS_PROFILE")? {
        config.aws.profile = Some(profile);
    }

    // Deployment settings
    if let Some(stack_name) = get_env_string(env, "STACK_NAME")? {
        config.deployment.stack_name = Some(stack_name);
    }
    if let Some(val) = get_env_u64(env, "MAX_WAIT_SECS")? {
        config.deployment.max_wait_secs = val;
    }
    if let Some(val) = get_env_u64(env, "POLL_INTERVAL_SECS")? {
        config.deployment.poll_interval_secs = val;
    }
    if let Some(val) = get_env_bool(env, "MONITORING")? {
        config.deployment.monitoring = val;
    }
    if let Some(prefix) = get_env_string(env, "NAME_PREFIX")? {
        config.deployment.naming.prefix = Some(prefix);
    }
    if let Some(suffix) = get_env_string(env, "NAME_SUFFIX")? {
        config.deployment.naming.suffix = Some(suffix);
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT")? {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get(key).and_then(non_empty))
}

fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Result<Option<String>> {
    Ok(env.get_raw(key).and_then(non_empty))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key)? {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{}{} must be a non-negative integer", ENV_PREFIX, key)),
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key)? {
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(anyhow!(
                "{}{} must be a boolean, got '{}'",
                ENV_PREFIX,
                key,
                other
            )),
        },
        None => Ok(None),
    }
}
