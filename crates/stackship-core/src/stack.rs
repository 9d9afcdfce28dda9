//! CloudFormation stack lifecycle: probe, submit, poll to a terminal status.

use crate::error::{DeployError, Result};
use async_trait::async_trait;
use serde::Serialize;
use stackship_config::DeploymentSettings;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const NO_UPDATES_MESSAGE: &str = "No updates are to be performed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

/// Snapshot of a stack as reported by `DescribeStacks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: Vec<StackOutput>,
}

impl StackDescription {
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }
}

/// Closed classification of a raw stack status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackState {
    Absent,
    InProgress {
        status: String,
    },
    Succeeded {
        status: String,
        outputs: Vec<StackOutput>,
    },
    Failed {
        status: String,
        reason: Option<String>,
    },
}

impl StackState {
    /// `DELETE_COMPLETE` counts as absent. `*_COMPLETE` statuses that mention
    /// a rollback are failures. Unrecognized statuses are treated as still
    /// in progress.
    pub fn classify(description: Option<&StackDescription>) -> Self {
        let Some(description) = description else {
            return StackState::Absent;
        };
        let status = description.status.as_str();

        if status == "DELETE_COMPLETE" {
            StackState::Absent
        } else if status.ends_with("_FAILED")
            || (status.ends_with("_COMPLETE") && status.contains("ROLLBACK"))
        {
            StackState::Failed {
                status: status.to_string(),
                reason: description.status_reason.clone(),
            }
        } else if status.ends_with("_COMPLETE") {
            StackState::Succeeded {
                status: status.to_string(),
                outputs: description.outputs.clone(),
            }
        } else {
            StackState::InProgress {
                status: status.to_string(),
            }
        }
    }
}

/// Errors returned by a [`StackApi`] implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StackApiError {
    /// Update submitted a template identical to the deployed one
    #[error("No updates are to be performed")]
    NoUpdates,

    #[error("{message}")]
    Api { message: String },
}

impl StackApiError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// True for the typed variant and for adapters that only surface the
    /// service message.
    pub fn is_no_updates(&self) -> bool {
        match self {
            Self::NoUpdates => true,
            Self::Api { message } => message.contains(NO_UPDATES_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capability {
    #[serde(rename = "CAPABILITY_IAM")]
    Iam,
    #[serde(rename = "CAPABILITY_NAMED_IAM")]
    NamedIam,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Iam => "CAPABILITY_IAM",
            Capability::NamedIam => "CAPABILITY_NAMED_IAM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackParameter {
    pub key: String,
    pub value: String,
}

/// One `CreateStack` or `UpdateStack` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template_body: String,
    pub parameters: Vec<StackParameter>,
    pub capabilities: Vec<Capability>,
    /// Sent on create only
    pub tags: BTreeMap<String, String>,
}

/// CloudFormation control plane
#[async_trait]
pub trait StackApi: Send + Sync {
    /// `Ok(None)` when the stack does not exist
    async fn describe_stack(
        &self,
        stack_name: &str,
    ) -> std::result::Result<Option<StackDescription>, StackApiError>;

    async fn create_stack(&self, request: &StackRequest) -> std::result::Result<(), StackApiError>;

    async fn update_stack(&self, request: &StackRequest) -> std::result::Result<(), StackApiError>;
}

#[async_trait]
impl<T: StackApi + ?Sized> StackApi for Arc<T> {
    async fn describe_stack(
        &self,
        stack_name: &str,
    ) -> std::result::Result<Option<StackDescription>, StackApiError> {
        (**self).describe_stack(stack_name).await
    }

    async fn create_stack(&self, request: &StackRequest) -> std::result::Result<(), StackApiError> {
        (**self).create_stack(request).await
    }

    async fn update_stack(&self, request: &StackRequest) -> std::result::Result<(), StackApiError> {
        (**self).update_stack(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&DeploymentSettings> for PollSettings {
    fn from(settings: &DeploymentSettings) -> Self {
        Self {
            interval: settings.poll_interval(),
            max_wait: settings.max_wait(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOperation {
    Create,
    Update,
    NoOp,
}

/// What to deploy
#[derive(Debug, Clone)]
pub struct StackSubmission {
    pub stack_name: String,
    pub template_body: String,
    pub application_name: String,
    pub tags: BTreeMap<String, String>,
}

impl StackSubmission {
    fn request(&self, include_tags: bool) -> StackRequest {
        let tags = if include_tags {
            let mut tags = BTreeMap::from([
                ("Application".to_string(), self.application_name.clone()),
                ("ManagedBy".to_string(), "stackship".to_string()),
            ]);
            tags.extend(self.tags.clone());
            tags
        } else {
            BTreeMap::new()
        };

        StackRequest {
            stack_name: self.stack_name.clone(),
            template_body: self.template_body.clone(),
            parameters: vec![StackParameter {
                key: "ApplicationName".to_string(),
                value: self.application_name.clone(),
            }],
            capabilities: vec![Capability::Iam, Capability::NamedIam],
            tags,
        }
    }
}

/// Terminal, successful result of a stack deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutcome {
    pub operation: StackOperation,
    pub description: StackDescription,
}

/// Drives one stack from absent or present to a terminal status
pub struct StackDriver<A> {
    api: A,
}

impl<A: StackApi> StackDriver<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Describe the stack; a missing stack is `Ok(None)`.
    pub async fn probe(&self, stack_name: &str) -> Result<Option<StackDescription>> {
        self.api
            .describe_stack(stack_name)
            .await
            .map_err(|e| DeployError::stack_api("describe", stack_name, e))
    }

    /// Create or update the stack and wait for it to settle.
    pub async fn deploy(
        &self,
        submission: &StackSubmission,
        poll: &PollSettings,
    ) -> Result<StackOutcome> {
        let stack_name = submission.stack_name.as_str();
        let existing = self.probe(stack_name).await?;

        if StackState::classify(existing.as_ref()) == StackState::Absent {
            info!(stack_name, "Creating stack");
            self.api
                .create_stack(&submission.request(true))
                .await
                .map_err(|e| DeployError::stack_api("create", stack_name, e))?;

            let description = self.wait_for_terminal(stack_name, poll).await?;
            return Ok(StackOutcome {
                operation: StackOperation::Create,
                description,
            });
        }

        info!(stack_name, "Updating stack");
        match self.api.update_stack(&submission.request(false)).await {
            Ok(()) => {
                let description = self.wait_for_terminal(stack_name, poll).await?;
                Ok(StackOutcome {
                    operation: StackOperation::Update,
                    description,
                })
            }
            Err(e) if e.is_no_updates() => {
                warn!(stack_name, "No changes to deploy; stack left as is");
                match self.probe(stack_name).await? {
                    Some(description)
                        if StackState::classify(Some(&description)) != StackState::Absent =>
                    {
                        Ok(StackOutcome {
                            operation: StackOperation::NoOp,
                            description,
                        })
                    }
                    _ => Err(DeployError::StackVanished {
                        stack_name: stack_name.to_string(),
                    }),
                }
            }
            Err(e) => Err(DeployError::stack_api("update", stack_name, e)),
        }
    }

    /// Poll until the stack reaches a terminal status or `poll.max_wait`
    /// elapses. The wait is a tokio timer, so dropping the future cancels it.
    pub async fn wait_for_terminal(
        &self,
        stack_name: &str,
        poll: &PollSettings,
    ) -> Result<StackDescription> {
        let started = Instant::now();

        loop {
            let description = self.probe(stack_name).await?;

            match StackState::classify(description.as_ref()) {
                StackState::Absent => {
                    return Err(DeployError::StackVanished {
                        stack_name: stack_name.to_string(),
                    });
                }
                StackState::Failed { status, reason } => {
                    return Err(DeployError::StackFailed {
                        stack_name: stack_name.to_string(),
                        status,
                        reason,
                    });
                }
                StackState::Succeeded { status, .. } => {
                    info!(stack_name, status = %status, "Stack reached terminal status");
                    if let Some(description) = description {
                        return Ok(description);
                    }
                }
                StackState::InProgress { status } => {
                    let elapsed = started.elapsed();
                    if elapsed >= poll.max_wait {
                        return Err(DeployError::Timeout {
                            stack_name: stack_name.to_string(),
                            elapsed_secs: elapsed.as_secs(),
                            last_status: status,
                        });
                    }

                    let wait = poll.interval.min(poll.max_wait - elapsed);
                    debug!(
                        stack_name,
                        status = %status,
                        elapsed_secs = elapsed.as_secs(),
                        "Stack still in progress"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn description(status: &str) -> StackDescription {
        StackDescription {
            name: "my-app-prod".to_string(),
            status: status.to_string(),
            status_reason: None,
            outputs: vec![StackOutput {
                key: "FunctionURL".to_string(),
                value: "https://abc.lambda-url.us-east-1.on.aws/".to_string(),
            }],
        }
    }

    /// Replays scripted describe results; the last one repeats forever
    #[derive(Default)]
    struct ScriptedApi {
        describes: Mutex<VecDeque<Option<StackDescription>>>,
        update_error: Option<StackApiError>,
        describe_error: Option<StackApiError>,
        requests: Mutex<Vec<(&'static str, StackRequest)>>,
        describe_calls: Mutex<usize>,
    }

    impl ScriptedApi {
        fn with_statuses(statuses: &[Option<&str>]) -> Self {
            Self {
                describes: Mutex::new(
                    statuses.iter().map(|s| s.map(description)).collect(),
                ),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl StackApi for ScriptedApi {
        async fn describe_stack(
            &self,
            _stack_name: &str,
        ) -> std::result::Result<Option<StackDescription>, StackApiError> {
            *self.describe_calls.lock().unwrap() += 1;
            if let Some(e) = &self.describe_error {
                return Err(e.clone());
            }
            let mut describes = self.describes.lock().unwrap();
            if describes.len() > 1 {
                Ok(describes.pop_front().flatten())
            } else {
                Ok(describes.front().cloned().flatten())
            }
        }

        async fn create_stack(
            &self,
            request: &StackRequest,
        ) -> std::result::Result<(), StackApiError> {
            self.requests
                .lock()
                .unwrap()
                .push(("create", request.clone()));
            Ok(())
        }

        async fn update_stack(
            &self,
            request: &StackRequest,
        ) -> std::result::Result<(), StackApiError> {
            self.requests
                .lock()
                .unwrap()
                .push(("update", request.clone()));
            match &self.update_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn submission() -> StackSubmission {
        StackSubmission {
            stack_name: "my-app-prod".to_string(),
            template_body: "{}".to_string(),
            application_name: "my-app".to_string(),
            tags: BTreeMap::from([("Team".to_string(), "web".to_string())]),
        }
    }

    #[test]
    fn classify_statuses() {
        let state = |s: &str| StackState::classify(Some(&description(s)));

        assert_eq!(StackState::classify(None), StackState::Absent);
        assert_eq!(state("DELETE_COMPLETE"), StackState::Absent);
        assert!(matches!(state("CREATE_COMPLETE"), StackState::Succeeded { .. }));
        assert!(matches!(state("UPDATE_COMPLETE"), StackState::Succeeded { .. }));
        assert!(matches!(state("CREATE_IN_PROGRESS"), StackState::InProgress { .. }));
        assert!(matches!(
            state("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackState::InProgress { .. }
        ));
        assert!(matches!(
            state("UPDATE_ROLLBACK_IN_PROGRESS"),
            StackState::InProgress { .. }
        ));
        for failed in [
            "CREATE_FAILED",
            "ROLLBACK_COMPLETE",
            "UPDATE_FAILED",
            "UPDATE_ROLLBACK_COMPLETE",
            "ROLLBACK_FAILED",
        ] {
            assert!(
                matches!(state(failed), StackState::Failed { .. }),
                "{failed}"
            );
        }
        assert!(matches!(state("SOMETHING_NEW"), StackState::InProgress { .. }));
    }

    #[test]
    fn no_updates_detection() {
        assert!(StackApiError::NoUpdates.is_no_updates());
        assert!(StackApiError::api("ValidationError: No updates are to be performed.").is_no_updates());
        assert!(!StackApiError::api("Access denied").is_no_updates());
    }

    #[test]
    fn create_request_carries_tags_and_capabilities() {
        let request = submission().request(true);
        assert_eq!(request.capabilities, vec![Capability::Iam, Capability::NamedIam]);
        assert_eq!(request.parameters.len(), 1);
        assert_eq!(request.parameters[0].key, "ApplicationName");
        assert_eq!(request.tags.get("ManagedBy").map(String::as_str), Some("stackship"));
        assert_eq!(request.tags.get("Application").map(String::as_str), Some("my-app"));
        assert_eq!(request.tags.get("Team").map(String::as_str), Some("web"));

        assert!(submission().request(false).tags.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn creates_absent_stack_and_polls_to_completion() {
        let api = ScriptedApi::with_statuses(&[
            None,
            Some("CREATE_IN_PROGRESS"),
            Some("CREATE_IN_PROGRESS"),
            Some("CREATE_COMPLETE"),
        ]);
        let driver = StackDriver::new(api);

        let outcome = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap();

        assert_eq!(outcome.operation, StackOperation::Create);
        assert_eq!(outcome.description.status, "CREATE_COMPLETE");
        assert!(outcome.description.output("FunctionURL").is_some());

        let requests = driver.api().requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "create");
        assert_eq!(*driver.api().describe_calls.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn describe_failure_propagates_without_submitting() {
        let api = ScriptedApi {
            describe_error: Some(StackApiError::api("Rate exceeded")),
            ..ScriptedApi::default()
        };
        let driver = StackDriver::new(api);

        let err = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::StackApi { operation: "describe", .. }
        ));
        assert!(err.to_string().contains("Rate exceeded"));
        assert!(driver.api().requests.lock().unwrap().is_empty());
        assert_eq!(*driver.api().describe_calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_stack_is_recreated() {
        let api = ScriptedApi::with_statuses(&[Some("DELETE_COMPLETE"), Some("CREATE_COMPLETE")]);
        let driver = StackDriver::new(api);

        let outcome = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap();
        assert_eq!(outcome.operation, StackOperation::Create);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_existing_stack() {
        let api = ScriptedApi::with_statuses(&[
            Some("CREATE_COMPLETE"),
            Some("UPDATE_IN_PROGRESS"),
            Some("UPDATE_COMPLETE"),
        ]);
        let driver = StackDriver::new(api);

        let outcome = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap();
        assert_eq!(outcome.operation, StackOperation::Update);
        assert_eq!(outcome.description.status, "UPDATE_COMPLETE");

        let requests = driver.api().requests.lock().unwrap();
        assert_eq!(requests[0].0, "update");
        assert!(requests[0].1.tags.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_updates_is_a_successful_no_op() {
        let api = ScriptedApi {
            update_error: Some(StackApiError::api(
                "Stack [my-app-prod] No updates are to be performed.",
            )),
            ..ScriptedApi::with_statuses(&[Some("UPDATE_COMPLETE")])
        };
        let driver = StackDriver::new(api);

        let outcome = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap();
        assert_eq!(outcome.operation, StackOperation::NoOp);
        assert_eq!(outcome.description.status, "UPDATE_COMPLETE");
    }

    #[tokio::test(start_paused = true)]
    async fn other_update_errors_propagate() {
        let api = ScriptedApi {
            update_error: Some(StackApiError::api("User is not authorized")),
            ..ScriptedApi::with_statuses(&[Some("CREATE_COMPLETE")])
        };
        let driver = StackDriver::new(api);

        let err = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::StackApi { operation: "update", .. }));
        assert!(err.to_string().contains("not authorized"));
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_is_reported_with_status() {
        let api = ScriptedApi::with_statuses(&[
            None,
            Some("CREATE_IN_PROGRESS"),
            Some("ROLLBACK_IN_PROGRESS"),
            Some("ROLLBACK_COMPLETE"),
        ]);
        let driver = StackDriver::new(api);

        let err = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap_err();
        match err {
            DeployError::StackFailed { status, .. } => assert_eq!(status, "ROLLBACK_COMPLETE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_stack_never_settles() {
        let api = ScriptedApi::with_statuses(&[None, Some("CREATE_IN_PROGRESS")]);
        let driver = StackDriver::new(api);
        let poll = PollSettings {
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(60),
        };

        let started = Instant::now();
        let err = driver.deploy(&submission(), &poll).await.unwrap_err();

        match err {
            DeployError::Timeout {
                elapsed_secs,
                last_status,
                ..
            } => {
                assert_eq!(elapsed_secs, 60);
                assert_eq!(last_status, "CREATE_IN_PROGRESS");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        // initial probe + 7 polls at 0s, 10s, ..., 60s
        assert_eq!(*driver.api().describe_calls.lock().unwrap(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn last_sleep_is_clamped_to_deadline() {
        let api = ScriptedApi::with_statuses(&[None, Some("CREATE_IN_PROGRESS")]);
        let driver = StackDriver::new(api);
        let poll = PollSettings {
            interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(25),
        };

        let started = Instant::now();
        let err = driver.deploy(&submission(), &poll).await.unwrap_err();
        assert!(matches!(err, DeployError::Timeout { elapsed_secs: 25, .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_stack_fails() {
        let api = ScriptedApi::with_statuses(&[None, Some("CREATE_IN_PROGRESS"), None]);
        let driver = StackDriver::new(api);

        let err = driver
            .deploy(&submission(), &PollSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::StackVanished { .. }));
    }
}
