// Configuration source loading.
//
// Priority order:
// 1. Environment variables (STACKSHIP_* prefix)
// 2. Explicit config file path (CLI --config)
// 3. Config file path from STACKSHIP_CONFIG
// 4. Default config files (./stackship.toml, ./.stackship.toml)

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::DeploymentConfig;
use anyhow::{bail, Context, Result};
use std::env;
use std::path::{Path, PathBuf};

const DEFAULT_PATHS: &[&str] = &["./stackship.toml", "./.stackship.toml"];

/// Load configuration from the first available file, then apply env overrides.
pub fn load_config() -> Result<DeploymentConfig> {
    let path = match env::var("STACKSHIP_CONFIG") {
        Ok(path) => PathBuf::from(path),
        Err(_) => match DEFAULT_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => path.to_path_buf(),
            None => bail!(
                "No configuration file found. Pass --config, set STACKSHIP_CONFIG, or create {}",
                DEFAULT_PATHS.join(" or ")
            ),
        },
    };
    load_from_file_path(path)
}

/// Load configuration from a specific file path (for CLI --config flag).
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<DeploymentConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content, path)?;

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;

    config.normalize();
    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str, path: &Path) -> Result<DeploymentConfig> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    } else {
        toml::from_str(content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

pub(crate) struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
