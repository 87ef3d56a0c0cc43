use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Manifest kind, which also picks the deploy endpoint on the runtime manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployKind {
    Application,
    SharedInfrastructure,
}

impl DeployKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "application" => Some(DeployKind::Application),
            "shared-infrastructure" => Some(DeployKind::SharedInfrastructure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeployKind::Application => "application",
            DeployKind::SharedInfrastructure => "shared-infrastructure",
        }
    }

    /// Trailing path segment of `run/self-hosted/deploy/{segment}`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            DeployKind::Application => "app",
            DeployKind::SharedInfrastructure => "infra",
        }
    }
}

impl fmt::Display for DeployKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work inside a run. Fields the client does not interpret are
/// kept in `extra` so they survive a round trip to the CI outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTask {
    #[serde(deserialize_with = "scalar_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error_message: None,
            extra: Map::new(),
        }
    }

    pub fn failure(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Body of a successful (201) deploy submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResult {
    pub run_id: String,
    pub run_type: String,
    pub tasks: Vec<RunTask>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    ProcessingRequest,
    Running,
    Other(String),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::ProcessingRequest)
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "PROCESSING_REQUEST" => RunStatus::ProcessingRequest,
            "RUNNING" => RunStatus::Running,
            _ => RunStatus::Other(value),
        }
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        match value {
            RunStatus::ProcessingRequest => "PROCESSING_REQUEST".into(),
            RunStatus::Running => "RUNNING".into(),
            RunStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::ProcessingRequest => f.write_str("PROCESSING_REQUEST"),
            RunStatus::Running => f.write_str("RUNNING"),
            RunStatus::Other(other) => f.write_str(other),
        }
    }
}

/// Body of `GET run/run-status/{runId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub status: RunStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<RunTask>,
}

impl RunStatusReport {
    /// Tasks that carry a non-null error message, in report order.
    pub fn failed_tasks(&self) -> impl Iterator<Item = &RunTask> {
        self.tasks.iter().filter(|task| task.failure().is_some())
    }
}

/// Task ids arrive as strings or numbers.
fn scalar_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        Value::Bool(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "task id must be a scalar, got {other}"
        ))),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RunTask>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RunTask>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipOutcome {
    /// The runtime manager found nothing to change and skipped the run.
    Skipped,
    Proceed,
}
