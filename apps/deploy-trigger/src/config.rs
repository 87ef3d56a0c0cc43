use std::env;
use std::path::PathBuf;
use std::time::Duration;

use runtime_manager_sdk::{Credentials, DEFAULT_IAM_BASE_URL, DEFAULT_RUNTIME_MANAGER_URL};
use thiserror::Error;

use crate::manifest::MANIFEST_FILE;
use crate::poller::PollSettings;
use crate::request::{BucketLocation, PipelineContext, StorageConfig};

const REQUIRED_INPUTS: [&str; 11] = [
    "ACTION_PATH",
    "CLIENT_ID",
    "CLIENT_KEY",
    "CLIENT_REALM",
    "TF_STATE_BUCKET_NAME",
    "TF_STATE_REGION",
    "IAC_BUCKET_NAME",
    "IAC_REGION",
    "GITHUB_SERVER_URL",
    "GITHUB_REPOSITORY",
    "GITHUB_RUN_ID",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required inputs: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the deploy step reads from its environment.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub action_path: PathBuf,
    pub credentials: Credentials,
    pub storage: StorageConfig,
    pub pipeline: PipelineContext,
    pub verbose: bool,
    pub skip_deploy: bool,
    pub output_path: Option<PathBuf>,
    pub iam_base_url: String,
    pub runtime_manager_url: String,
    pub poll: PollSettings,
}

impl DeployConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Every missing required input is
    /// collected before failing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED_INPUTS
            .iter()
            .copied()
            .filter(|name| value(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |name: &'static str| value(name).unwrap_or_default();

        let poll_interval = match value("POLL_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("POLL_INTERVAL_SECS", &raw)?),
            None => PollSettings::default().interval,
        };
        let max_wait = value("POLL_MAX_WAIT_SECS")
            .map(|raw| parse_secs("POLL_MAX_WAIT_SECS", &raw).map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            action_path: PathBuf::from(required("ACTION_PATH")),
            credentials: Credentials::new(
                required("CLIENT_ID"),
                required("CLIENT_KEY"),
                required("CLIENT_REALM"),
            ),
            storage: StorageConfig {
                tfstate: BucketLocation {
                    bucket: required("TF_STATE_BUCKET_NAME"),
                    region: required("TF_STATE_REGION"),
                },
                iac: BucketLocation {
                    bucket: required("IAC_BUCKET_NAME"),
                    region: required("IAC_REGION"),
                },
            },
            pipeline: PipelineContext {
                server_url: required("GITHUB_SERVER_URL"),
                repository: required("GITHUB_REPOSITORY"),
                run_id: required("GITHUB_RUN_ID"),
            },
            // Presence alone turns verbose mode on.
            verbose: lookup("VERBOSE").is_some(),
            skip_deploy: value("SKIP_DEPLOY").map(|v| truthy(&v)).unwrap_or(false),
            output_path: value("GITHUB_OUTPUT").map(PathBuf::from),
            iam_base_url: value("IAM_BASE_URL").unwrap_or_else(|| DEFAULT_IAM_BASE_URL.into()),
            runtime_manager_url: value("RUNTIME_MANAGER_URL")
                .unwrap_or_else(|| DEFAULT_RUNTIME_MANAGER_URL.into()),
            poll: PollSettings {
                interval: poll_interval,
                max_wait,
                ..PollSettings::default()
            },
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.action_path.join(MANIFEST_FILE)
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|err| ConfigError::Invalid {
        name,
        reason: format!("'{raw}' is not a number of seconds: {err}"),
    })
}

pub fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
