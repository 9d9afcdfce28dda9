//! Error types for deployment orchestration.

use crate::stack::StackApiError;
use crate::template::TemplateError;
use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Configuration missing or invalid
    E001InvalidConfig,
    /// E002: Generated template failed shape validation
    E002InvalidTemplate,
    /// E003: CloudFormation API call rejected
    E003StackApi,
    /// E004: Stack reached a failed or rolled-back status
    E004StackFailed,
    /// E005: Stack did not reach a terminal status in time
    E005Timeout,
    /// E006: Uploading application code failed
    E006CodeSync,
    /// E007: Deployment precondition (e.g. advisory lock) not met
    E007Precondition,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001InvalidConfig => "E001",
            Self::E002InvalidTemplate => "E002",
            Self::E003StackApi => "E003",
            Self::E004StackFailed => "E004",
            Self::E005Timeout => "E005",
            Self::E006CodeSync => "E006",
            Self::E007Precondition => "E007",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while deploying an application
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration failed pre-deployment validation
    #[error("[E001] Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generated template is malformed
    #[error("[E002] Invalid template: {0}")]
    Template(#[from] TemplateError),

    /// CloudFormation rejected a describe/create/update call
    #[error("[E003] CloudFormation {operation} failed for stack '{stack_name}': {source}")]
    StackApi {
        operation: &'static str,
        stack_name: String,
        #[source]
        source: StackApiError,
    },

    /// Stack finished in a failed or rolled-back status
    #[error("[E004] Stack '{stack_name}' finished with status {status}{}", format_reason(.reason))]
    StackFailed {
        stack_name: String,
        status: String,
        reason: Option<String>,
    },

    /// Stack disappeared while waiting for it to complete
    #[error("[E004] Stack '{stack_name}' no longer exists")]
    StackVanished { stack_name: String },

    /// Polling exceeded the configured maximum wait
    #[error("[E005] Timed out after {elapsed_secs} seconds waiting for stack '{stack_name}' to reach a terminal status (last status: {last_status})")]
    Timeout {
        stack_name: String,
        elapsed_secs: u64,
        last_status: String,
    },

    /// Infrastructure succeeded but code upload failed
    #[error("[E006] Code sync to {target} failed: {message}")]
    CodeSync { target: String, message: String },

    /// Precondition hook refused the deployment
    #[error("[E007] Deployment precondition failed for stack '{stack_name}': {message}")]
    Precondition { stack_name: String, message: String },
}

fn format_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!(" ({})", reason),
        _ => String::new(),
    }
}

impl DeployError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::E001InvalidConfig,
            Self::Template(_) => ErrorCode::E002InvalidTemplate,
            Self::StackApi { .. } => ErrorCode::E003StackApi,
            Self::StackFailed { .. } | Self::StackVanished { .. } => ErrorCode::E004StackFailed,
            Self::Timeout { .. } => ErrorCode::E005Timeout,
            Self::CodeSync { .. } => ErrorCode::E006CodeSync,
            Self::Precondition { .. } => ErrorCode::E007Precondition,
        }
    }

    /// Suggested next step for the operator
    pub fn hint(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => {
                "Fix the named configuration field and run the deployment again"
            }
            Self::Template(_) => {
                "Check application names and monitoring settings; the generated template was rejected locally"
            }
            Self::StackApi { .. } => {
                "Check AWS credentials and permissions, and that the stack is in an updatable state"
            }
            Self::StackFailed { .. } | Self::StackVanished { .. } => {
                "Inspect the stack events in the CloudFormation console, fix the cause and redeploy"
            }
            Self::Timeout { .. } => {
                "The stack operation continues in AWS; check its status before retrying or raise deployment.max_wait_secs"
            }
            Self::CodeSync { .. } => {
                "Infrastructure is in place; check the source directory and permissions, then redeploy to retry the upload"
            }
            Self::Precondition { .. } => {
                "Another deployment may hold the lock for this stack; wait for it to finish and retry"
            }
        }
    }

    pub(crate) fn stack_api(
        operation: &'static str,
        stack_name: impl Into<String>,
        source: StackApiError,
    ) -> Self {
        Self::StackApi {
            operation,
            stack_name: stack_name.into(),
            source,
        }
    }

    pub(crate) fn code_sync(target: impl Into<String>, error: anyhow::Error) -> Self {
        Self::CodeSync {
            target: target.into(),
            message: format!("{:#}", error),
        }
    }
}

/// Result type alias for DeployError
pub type Result<T> = std::result::Result<T, DeployError>;
