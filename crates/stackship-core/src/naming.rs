//! AWS resource name derivation.
//!
//! Every name is assembled from `[prefix, application, environment,
//! discriminator, suffix]`, sanitized to `[A-Za-z0-9-]`, and shortened with a
//! stable hash suffix when it exceeds the limit of its resource class.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use stackship_config::DeploymentConfig;
use std::collections::HashSet;

const HASH_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const FALLBACK_NAME: &str = "app";
const LOG_GROUP_PREFIX: &str = "/aws/lambda/";

/// Resource classes with distinct naming limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Stack,
    S3Bucket,
    LambdaFunction,
    IamRole,
    LogGroup,
}

impl ResourceKind {
    pub fn max_len(&self) -> usize {
        match self {
            ResourceKind::Stack => 128,
            ResourceKind::S3Bucket => 63,
            ResourceKind::LambdaFunction => 64,
            ResourceKind::IamRole => 64,
            ResourceKind::LogGroup => 512,
        }
    }
}

/// How the S3 bucket name is kept distinct between deployments of the same app
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BucketUniqueness {
    /// Short hash of the naming identity (application, type, environment,
    /// region, account, affixes); reproducible across runs
    #[default]
    ConfigHash,
    /// Caller-supplied token, e.g. a CI run ID
    IdempotencyKey(String),
}

/// Inputs to name derivation, scoped to a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    pub application_name: String,
    pub environment: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl NamingConfig {
    pub fn from_config(config: &DeploymentConfig, environment: Option<&str>) -> Self {
        Self {
            application_name: config.application.name.clone(),
            environment: environment.map(str::to_string),
            prefix: config.deployment.naming.prefix.clone(),
            suffix: config.deployment.naming.suffix.clone(),
        }
    }

    /// Sanitized, length-limited name for a resource class
    pub fn name_for(&self, discriminator: &[&str], kind: ResourceKind) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(discriminator.len() + 4);
        parts.extend(self.prefix.as_deref());
        parts.push(&self.application_name);
        parts.extend(self.environment.as_deref());
        parts.extend_from_slice(discriminator);
        parts.extend(self.suffix.as_deref());

        let joined = parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        let mut name = sanitize(&joined);
        if kind == ResourceKind::S3Bucket {
            name.make_ascii_lowercase();
        }
        truncate_to_limit(&name, kind.max_len())
    }

    pub fn stack_name(&self) -> String {
        self.name_for(&[], ResourceKind::Stack)
    }
}

/// Generated names for one application deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    pub stack_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_execution_role_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_gateway_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_group_name: Option<String>,
}

impl ResourceNames {
    /// Populated fields as `(field, name)` pairs
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = vec![("stack_name", self.stack_name.as_str())];
        let optional = [
            ("s3_bucket_name", &self.s3_bucket_name),
            ("lambda_function_name", &self.lambda_function_name),
            ("lambda_execution_role_name", &self.lambda_execution_role_name),
            ("api_gateway_name", &self.api_gateway_name),
            ("log_group_name", &self.log_group_name),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(field, value)| value.as_deref().map(|v| (field, v))),
        );
        fields
    }
}

/// Derive every resource name the application type needs.
///
/// An explicit `deployment.stack_name` is kept (sanitized) as the stack name.
/// API Gateway names are never produced: backends are exposed through
/// Lambda Function URLs.
pub fn generate_resource_names(
    config: &DeploymentConfig,
    environment: Option<&str>,
    uniqueness: &BucketUniqueness,
) -> ResourceNames {
    let naming = NamingConfig::from_config(config, environment);
    let app_type = config.application.app_type;

    // Explicit names are checked by config validation and used as given
    let stack_name = match config.deployment.stack_name.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_string(),
        _ => naming.stack_name(),
    };

    let s3_bucket_name = app_type.requires_frontend().then(|| {
        let token = bucket_token(config, environment, uniqueness);
        naming.name_for(&["frontend", &token], ResourceKind::S3Bucket)
    });

    let (lambda_function_name, lambda_execution_role_name, log_group_name) =
        if app_type.requires_backend() {
            let function = naming.name_for(&["lambda"], ResourceKind::LambdaFunction);
            let role = naming.name_for(&["lambda", "role"], ResourceKind::IamRole);
            let log_group = truncate_to_limit(
                &format!("{}{}", LOG_GROUP_PREFIX, function),
                ResourceKind::LogGroup.max_len(),
            );
            (Some(function), Some(role), Some(log_group))
        } else {
            (None, None, None)
        };

    ResourceNames {
        stack_name,
        s3_bucket_name,
        lambda_function_name,
        lambda_execution_role_name,
        api_gateway_name: None,
        log_group_name,
    }
}

fn bucket_token(
    config: &DeploymentConfig,
    environment: Option<&str>,
    uniqueness: &BucketUniqueness,
) -> String {
    match uniqueness {
        BucketUniqueness::IdempotencyKey(key) => key.to_lowercase(),
        BucketUniqueness::ConfigHash => {
            let mut hasher = blake3::Hasher::new();
            let app_type = config.application.app_type.to_string();
            let identity = [
                config.application.name.as_str(),
                app_type.as_str(),
                environment.unwrap_or_default(),
                config.aws.region.as_str(),
                config.aws.account_id.as_deref().unwrap_or_default(),
                config.deployment.naming.prefix.as_deref().unwrap_or_default(),
                config.deployment.naming.suffix.as_deref().unwrap_or_default(),
            ];
            for field in identity {
                hasher.update(field.as_bytes());
                hasher.update(&[0]);
            }
            hex::encode(&hasher.finalize().as_bytes()[..4])
        }
    }
}

/// Names from `names` that already exist, compared case-insensitively,
/// formatted as `"<field>: <name>"`.
pub fn check_naming_conflicts<I, S>(names: &ResourceNames, existing: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let existing: HashSet<String> = existing
        .into_iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();

    names
        .fields()
        .into_iter()
        .filter(|(_, name)| existing.contains(&name.to_lowercase()))
        .map(|(field, name)| format!("{}: {}", field, name))
        .collect()
}

/// Produce the configuration for one environment.
///
/// `overrides` is deep-merged onto `base`: objects merge key by key, arrays
/// and scalars are replaced. A stack name is derived only when none is set.
/// `Environment` and `Application` tags always reflect the resolved values;
/// other caller tags are kept.
pub fn resolve_environment_config(
    base: &DeploymentConfig,
    environment: &str,
    overrides: Option<&Value>,
) -> Result<DeploymentConfig> {
    let mut config = merge_environment_overrides(base, environment, overrides)?;

    if config.deployment.stack_name.is_none() {
        let naming = NamingConfig::from_config(&config, Some(environment));
        config.deployment.stack_name = Some(naming.stack_name());
    }

    let application = config.application.name.clone();
    let tags = &mut config.deployment.tags;
    tags.insert("Environment".to_string(), environment.to_string());
    tags.insert("Application".to_string(), application);

    Ok(config)
}

/// Deep-merge `overrides` onto `base` without deriving names or tags.
///
/// Lets callers layer further sources (env vars) between the merge and
/// [`resolve_environment_config`].
pub fn merge_environment_overrides(
    base: &DeploymentConfig,
    environment: &str,
    overrides: Option<&Value>,
) -> Result<DeploymentConfig> {
    let Some(overrides) = overrides else {
        return Ok(base.clone());
    };

    let mut merged = serde_json::to_value(base).context("Failed to serialize base config")?;
    deep_merge(&mut merged, overrides);

    serde_json::from_value(merged).with_context(|| {
        format!(
            "Overrides for environment '{}' do not form a valid configuration",
            environment
        )
    })
}

fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

/// Restrict a name to `[A-Za-z0-9-]`, starting with a letter, without
/// repeated or dangling hyphens.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_end_matches('-');

    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_alphabetic()) {
        trimmed.to_string()
    } else {
        format!("{}-{}", FALLBACK_NAME, trimmed)
    }
}

/// Shorten `name` to `max_len`, keeping a readable head and appending a
/// 6-character base-36 hash of the full name.
pub fn truncate_to_limit(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }

    let hash = short_hash(name);
    let keep = max_len.saturating_sub(HASH_LEN + 1);
    let head: String = name.chars().take(keep).collect();
    let head = head.trim_end_matches('-');

    if head.is_empty() {
        hash
    } else {
        format!("{}-{}", head, hash)
    }
}

/// Rolling multiply-by-31 hash folded to 32 bits, rendered as 6 base-36 digits.
/// Not cryptographic; only spreads names that share a truncated head.
pub fn short_hash(input: &str) -> String {
    let mut hash: i32 = 0;
    for c in input.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(c as i32);
    }

    let mut value = u64::from(hash.unsigned_abs()) % 36u64.pow(HASH_LEN as u32);
    let mut digits = [b'0'; HASH_LEN];
    for slot in digits.iter_mut().rev() {
        *slot = BASE36[(value % 36) as usize];
        value /= 36;
    }
    digits.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackship_config::{ApplicationType, BackendConfig, FrontendConfig};
    use std::collections::BTreeMap;

    fn backend_config(name: &str) -> DeploymentConfig {
        let mut config = DeploymentConfig::new(name, ApplicationType::Backend);
        config.backend = Some(BackendConfig {
            source_dir: "./src".to_string(),
            handler: "index.handler".to_string(),
            runtime: "nodejs20.x".to_string(),
            memory_size: 128,
            timeout: 30,
            environment: BTreeMap::new(),
        });
        config
    }

    fn frontend_config(name: &str) -> DeploymentConfig {
        let mut config = DeploymentConfig::new(name, ApplicationType::Frontend);
        config.frontend = Some(FrontendConfig {
            source_dir: "./dist".to_string(),
            index_document: "index.html".to_string(),
            error_document: "error.html".to_string(),
        });
        config
    }

    fn is_hash_suffixed(name: &str) -> bool {
        let Some((head, hash)) = name.rsplit_once('-') else {
            return false;
        };
        !head.is_empty()
            && hash.len() == HASH_LEN
            && hash
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    }

    fn assert_sanitized(name: &str) {
        assert!(
            name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
            "invalid character in {name}"
        );
        assert!(
            name.starts_with(|c: char| c.is_ascii_alphabetic()),
            "{name} must start with a letter"
        );
        assert!(!name.contains("--"), "{name} has consecutive hyphens");
        assert!(!name.ends_with('-'), "{name} ends with a hyphen");
    }

    #[test]
    fn backend_production_names() {
        let names = generate_resource_names(
            &backend_config("my-app"),
            Some("production"),
            &BucketUniqueness::default(),
        );

        assert_eq!(names.stack_name, "my-app-production");
        assert_eq!(
            names.lambda_function_name.as_deref(),
            Some("my-app-production-lambda")
        );
        assert_eq!(
            names.lambda_execution_role_name.as_deref(),
            Some("my-app-production-lambda-role")
        );
        assert_eq!(
            names.log_group_name.as_deref(),
            Some("/aws/lambda/my-app-production-lambda")
        );
        assert_eq!(names.s3_bucket_name, None);
        assert_eq!(names.api_gateway_name, None);
    }

    #[test]
    fn names_are_deterministic() {
        let mut config = backend_config("My App");
        config.deployment.naming.prefix = Some("acme".to_string());
        config.deployment.naming.suffix = Some("v2".to_string());

        let first = generate_resource_names(&config, Some("staging"), &BucketUniqueness::default());
        let second =
            generate_resource_names(&config, Some("staging"), &BucketUniqueness::default());
        assert_eq!(first, second);
        assert_eq!(first.stack_name, "acme-My-App-staging-v2");
    }

    #[test]
    fn gating_follows_application_type() {
        let uniqueness = BucketUniqueness::default();

        let frontend = generate_resource_names(&frontend_config("site"), None, &uniqueness);
        assert!(frontend.s3_bucket_name.is_some());
        assert!(frontend.lambda_function_name.is_none());
        assert!(frontend.lambda_execution_role_name.is_none());
        assert!(frontend.log_group_name.is_none());

        let backend = generate_resource_names(&backend_config("api"), None, &uniqueness);
        assert!(backend.s3_bucket_name.is_none());
        assert!(backend.lambda_function_name.is_some());

        let fullstack = generate_resource_names(
            &DeploymentConfig::new("both", ApplicationType::Fullstack),
            None,
            &uniqueness,
        );
        assert!(fullstack.s3_bucket_name.is_some());
        assert!(fullstack.lambda_function_name.is_some());

        for names in [frontend, backend, fullstack] {
            assert!(names.api_gateway_name.is_none());
        }
    }

    #[test]
    fn long_application_name_is_truncated_with_hash() {
        let config = backend_config(&"a".repeat(100));
        let names = generate_resource_names(&config, None, &BucketUniqueness::default());

        let function = names.lambda_function_name.unwrap();
        assert!(function.len() <= 64);
        assert!(is_hash_suffixed(&function), "{function}");
        let (head, _) = function.rsplit_once('-').unwrap();
        assert!(head.chars().all(|c| c == 'a'));

        let role = names.lambda_execution_role_name.unwrap();
        assert!(role.len() <= 64);
        assert!(is_hash_suffixed(&role));
        assert_ne!(function, role);

        assert_eq!(names.stack_name, "a".repeat(100));
    }

    #[test]
    fn every_name_respects_limits_and_character_rules() {
        let hyphens = "x-".repeat(80);
        let spaced = "Mixed Case ".repeat(20);
        let awkward = [
            "",
            "---",
            "123 start with digits",
            "Ünïcödé app!!",
            "under_score.dots/slashes",
            hyphens.as_str(),
            spaced.as_str(),
        ];

        for raw in awkward {
            let mut config = DeploymentConfig::new(raw, ApplicationType::Fullstack);
            config.deployment.naming.prefix = Some("__".to_string());
            let names =
                generate_resource_names(&config, Some("dev env"), &BucketUniqueness::default());

            assert!(names.stack_name.len() <= ResourceKind::Stack.max_len());
            assert_sanitized(&names.stack_name);

            let bucket = names.s3_bucket_name.as_deref().unwrap();
            assert!(bucket.len() <= ResourceKind::S3Bucket.max_len());
            assert_sanitized(bucket);
            assert_eq!(bucket, bucket.to_lowercase());

            let function = names.lambda_function_name.as_deref().unwrap();
            assert!(function.len() <= ResourceKind::LambdaFunction.max_len());
            assert_sanitized(function);

            let role = names.lambda_execution_role_name.as_deref().unwrap();
            assert!(role.len() <= ResourceKind::IamRole.max_len());
            assert_sanitized(role);

            let log_group = names.log_group_name.as_deref().unwrap();
            assert_eq!(log_group, format!("/aws/lambda/{}", function));
            assert!(log_group.len() <= ResourceKind::LogGroup.max_len());
        }
    }

    #[test]
    fn sanitize_rules() {
        assert_eq!(sanitize("my_app.v2"), "my-app-v2");
        assert_eq!(sanitize("--a---b--"), "a-b");
        assert_eq!(sanitize("42things"), "app-42things");
        assert_eq!(sanitize(""), "app");
        assert_eq!(sanitize("!!!"), "app");
        assert_eq!(sanitize("-9"), "app-9");
    }

    #[test]
    fn truncation_is_stable_and_distinguishes_similar_names() {
        let base = "b".repeat(70);
        let one = truncate_to_limit(&format!("{}-one", base), 64);
        let two = truncate_to_limit(&format!("{}-two", base), 64);

        assert_eq!(one.len(), 64);
        assert_eq!(two.len(), 64);
        assert_ne!(one, two);
        assert_eq!(one, truncate_to_limit(&format!("{}-one", base), 64));

        assert_eq!(truncate_to_limit("short", 64), "short");
    }

    #[test]
    fn truncation_never_leaves_double_hyphen() {
        // Cut point lands right after a hyphen
        let name = format!("{}-{}", "c".repeat(56), "d".repeat(20));
        let truncated = truncate_to_limit(&name, 64);
        assert!(!truncated.contains("--"), "{truncated}");
        assert!(is_hash_suffixed(&truncated));
    }

    #[test]
    fn short_hash_is_six_base36_chars() {
        let long = "z".repeat(500);
        for input in ["", "a", "my-app-production-lambda", long.as_str()] {
            let hash = short_hash(input);
            assert_eq!(hash.len(), 6);
            assert!(hash
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
        assert_eq!(short_hash(""), "000000");
        assert_ne!(short_hash("abc"), short_hash("abd"));
    }

    #[test]
    fn bucket_uniqueness_modes() {
        let config = frontend_config("site");

        let hashed_a = generate_resource_names(&config, Some("dev"), &BucketUniqueness::ConfigHash);
        let hashed_b = generate_resource_names(&config, Some("dev"), &BucketUniqueness::ConfigHash);
        assert_eq!(hashed_a.s3_bucket_name, hashed_b.s3_bucket_name);

        let other_env =
            generate_resource_names(&config, Some("prod"), &BucketUniqueness::ConfigHash);
        assert_ne!(hashed_a.s3_bucket_name, other_env.s3_bucket_name);

        let keyed = generate_resource_names(
            &config,
            Some("dev"),
            &BucketUniqueness::IdempotencyKey("Run-42".to_string()),
        );
        assert_eq!(
            keyed.s3_bucket_name.as_deref(),
            Some("site-dev-frontend-run-42")
        );
    }

    #[test]
    fn explicit_stack_name_is_kept() {
        let mut config = backend_config("my-app");
        config.deployment.stack_name = Some(" Custom-Stack ".to_string());
        let names = generate_resource_names(&config, Some("prod"), &BucketUniqueness::default());
        assert_eq!(names.stack_name, "Custom-Stack");
        assert_eq!(
            names.lambda_function_name.as_deref(),
            Some("my-app-prod-lambda")
        );
    }

    #[test]
    fn conflicts_are_case_insensitive() {
        let names = ResourceNames {
            stack_name: "My-App-Stack".to_string(),
            s3_bucket_name: None,
            lambda_function_name: Some("my-app-lambda".to_string()),
            lambda_execution_role_name: Some("my-app-lambda-role".to_string()),
            api_gateway_name: None,
            log_group_name: None,
        };

        let conflicts = check_naming_conflicts(&names, ["my-app-stack", "MY-APP-LAMBDA", "other"]);
        assert_eq!(
            conflicts,
            vec![
                "stack_name: My-App-Stack".to_string(),
                "lambda_function_name: my-app-lambda".to_string(),
            ]
        );

        assert!(check_naming_conflicts(&names, Vec::<String>::new()).is_empty());
    }

    #[test]
    fn resolve_environment_merges_and_tags() {
        let mut base = backend_config("my-app");
        base.deployment
            .tags
            .insert("Team".to_string(), "web".to_string());
        base.deployment
            .tags
            .insert("Environment".to_string(), "user-value".to_string());

        let overrides = serde_json::json!({
            "backend": { "memory_size": 512, "environment": { "LOG_LEVEL": "debug" } },
            "aws": { "region": "eu-west-1" }
        });

        let resolved = resolve_environment_config(&base, "production", Some(&overrides)).unwrap();
        let backend = resolved.backend.as_ref().unwrap();

        assert_eq!(backend.memory_size, 512);
        assert_eq!(backend.handler, "index.handler");
        assert_eq!(
            backend.environment.get("LOG_LEVEL").map(String::as_str),
            Some("debug")
        );
        assert_eq!(resolved.aws.region, "eu-west-1");
        assert_eq!(
            resolved.deployment.stack_name.as_deref(),
            Some("my-app-production")
        );

        let tags = &resolved.deployment.tags;
        assert_eq!(tags.get("Environment").map(String::as_str), Some("production"));
        assert_eq!(tags.get("Application").map(String::as_str), Some("my-app"));
        assert_eq!(tags.get("Team").map(String::as_str), Some("web"));
    }

    #[test]
    fn resolve_environment_keeps_explicit_stack_name_and_replaces_arrays() {
        let mut base = backend_config("my-app");
        base.deployment.stack_name = Some("pinned".to_string());

        let resolved = resolve_environment_config(&base, "dev", None).unwrap();
        assert_eq!(resolved.deployment.stack_name.as_deref(), Some("pinned"));

        let mut target = serde_json::json!({ "list": [1, 2, 3], "nested": { "a": 1, "b": 2 } });
        deep_merge(
            &mut target,
            &serde_json::json!({ "list": [9], "nested": { "b": 3 } }),
        );
        assert_eq!(
            target,
            serde_json::json!({ "list": [9], "nested": { "a": 1, "b": 3 } })
        );
    }

    #[test]
    fn merge_alone_derives_nothing() {
        let base = backend_config("my-app");
        let overrides = serde_json::json!({ "deployment": { "naming": { "prefix": "team" } } });

        let merged = merge_environment_overrides(&base, "dev", Some(&overrides)).unwrap();
        assert_eq!(merged.deployment.naming.prefix.as_deref(), Some("team"));
        assert!(merged.deployment.stack_name.is_none());
        assert!(merged.deployment.tags.is_empty());

        assert_eq!(merge_environment_overrides(&base, "dev", None).unwrap(), base);
    }

    #[test]
    fn resolve_environment_rejects_invalid_overrides() {
        let base = backend_config("my-app");
        let overrides = serde_json::json!({ "application": { "type": "mobile" } });
        assert!(resolve_environment_config(&base, "dev", Some(&overrides)).is_err());
    }
}
