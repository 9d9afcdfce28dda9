// stackship-config - Deployment configuration for stackship
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Explicit config file path (CLI --config)
// 3. Config file path from STACKSHIP_CONFIG env var
// 4. Default config file locations (./stackship.toml, ./.stackship.toml)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};

/// Complete deployment configuration for one application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub application: ApplicationConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<FrontendConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    #[serde(default)]
    pub deployment: DeploymentSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-environment overrides, deep-merged onto the base when deploying
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub app_type: ApplicationType,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationType {
    Frontend,
    Backend,
    Fullstack,
}

impl ApplicationType {
    /// Static site assets are deployed to an S3 bucket
    pub fn requires_frontend(&self) -> bool {
        matches!(self, ApplicationType::Frontend | ApplicationType::Fullstack)
    }

    /// Code is deployed to a Lambda function
    pub fn requires_backend(&self) -> bool {
        matches!(self, ApplicationType::Backend | ApplicationType::Fullstack)
    }
}

impl std::fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationType::Frontend => write!(f, "frontend"),
            ApplicationType::Backend => write!(f, "backend"),
            ApplicationType::Fullstack => write!(f, "fullstack"),
        }
    }
}

impl std::str::FromStr for ApplicationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "frontend" | "static" => Ok(ApplicationType::Frontend),
            "backend" | "api" => Ok(ApplicationType::Backend),
            "fullstack" | "full-stack" => Ok(ApplicationType::Fullstack),
            _ => anyhow::bail!(
                "Unsupported application type: {}. Supported: frontend, backend, fullstack",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: None,
            account_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub source_dir: String,
    #[serde(default = "default_index_document")]
    pub index_document: String,
    #[serde(default = "default_error_document")]
    pub error_document: String,
}

fn default_index_document() -> String {
    "index.html".to_string()
}

fn default_error_document() -> String {
    "error.html".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub source_dir: String,
    pub handler: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Memory in MB
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,
    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

fn default_runtime() -> String {
    "nodejs20.x".to_string()
}

fn default_memory_size() -> u32 {
    128
}

fn default_timeout() -> u32 {
    30
}

/// Stack-level deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSettings {
    /// Explicit stack name; derived from the application name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub monitoring: bool,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    #[serde(default)]
    pub naming: NamingSettings,
}

fn default_max_wait_secs() -> u64 {
    30 * 60
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_log_retention_days() -> u32 {
    14
}

impl DeploymentSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            stack_name: None,
            tags: BTreeMap::new(),
            monitoring: false,
            max_wait_secs: default_max_wait_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            log_retention_days: default_log_retention_days(),
            naming: NamingSettings::default(),
        }
    }
}

/// Optional affixes applied to every generated resource name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl DeploymentConfig {
    /// Minimal configuration for an application, all other sections defaulted
    pub fn new(name: impl Into<String>, app_type: ApplicationType) -> Self {
        Self {
            application: ApplicationConfig {
                name: name.into(),
                app_type,
                version: default_version(),
            },
            aws: AwsConfig::default(),
            frontend: None,
            backend: None,
            deployment: DeploymentSettings::default(),
            logging: LoggingConfig::default(),
            environments: BTreeMap::new(),
        }
    }

    /// Override table for `environment`, if the file declares one
    pub fn environment_overrides(&self, environment: &str) -> Option<&serde_json::Value> {
        self.environments.get(environment)
    }

    /// Load configuration from the standard locations with env overrides
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI --config flag)
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Parse configuration from file contents; `.json` paths are parsed as JSON
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        sources::parse_config(content, path)
    }

    /// Re-apply `STACKSHIP_*` overrides from the process environment, e.g.
    /// after merging a per-environment table on top of a loaded file
    pub fn apply_env(&mut self) -> Result<()> {
        env_overrides::apply_env_overrides(self, &sources::StdEnvSource)
    }

    /// Trim user input and fill in values that have sensible derivations
    pub fn normalize(&mut self) {
        self.application.name = self.application.name.trim().to_string();
        self.aws.region = self.aws.region.trim().to_lowercase();
        if self.aws.region.is_empty() {
            self.aws.region = default_region();
        }
        if let Some(stack_name) = &self.deployment.stack_name {
            let trimmed = stack_name.trim();
            self.deployment.stack_name = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        for affix in [
            &mut self.deployment.naming.prefix,
            &mut self.deployment.naming.suffix,
        ] {
            if affix.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *affix = None;
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
