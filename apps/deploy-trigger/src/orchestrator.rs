//! Top-level driver: manifest, token, request, submit, skip-check, outputs,
//! then status polling. Every remote call is awaited before the next starts.

use std::path::PathBuf;

use runtime_manager_sdk::{
    AccessToken, DeployResult, IamClient, IamError, ManagerError, RuntimeManagerClient,
    SkipOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ConfigError, DeployConfig};
use crate::error::DeployError;
use crate::manifest::Manifest;
use crate::output::{publish_run_outputs, OutputSink};
use crate::poller::StatusPoller;
use crate::request::build_deploy_request;

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Overrides `{ACTION_PATH}/manifest.yaml`.
    pub manifest_path: Option<PathBuf>,
    /// Poll the run after submission.
    pub wait: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            manifest_path: None,
            wait: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeployOutcome {
    /// The run passed validation and is executing.
    Running(DeployResult),
    /// The runtime manager found no changes and skipped the run.
    Skipped(DeployResult),
    /// Submitted without waiting for validation.
    Submitted(DeployResult),
}

impl DeployOutcome {
    pub fn result(&self) -> &DeployResult {
        match self {
            DeployOutcome::Running(result)
            | DeployOutcome::Skipped(result)
            | DeployOutcome::Submitted(result) => result,
        }
    }
}

pub async fn run(
    config: &DeployConfig,
    options: &RunOptions,
    sink: &mut dyn OutputSink,
    cancel: &CancellationToken,
) -> Result<DeployOutcome, DeployError> {
    let manifest_path = options
        .manifest_path
        .clone()
        .unwrap_or_else(|| config.manifest_path());
    let manifest = Manifest::load(&manifest_path)?;
    if config.verbose {
        debug!(manifest = %serde_json::Value::Object(manifest.raw().clone()), "manifest loaded");
    }
    info!(
        kind = %manifest.kind,
        id = %manifest.id,
        "{} project identified, with ID: {}",
        manifest.kind,
        manifest.id
    );

    let iam = IamClient::new(&config.iam_base_url, config.credentials.clone())
        .map_err(iam_setup_error)?;
    let manager = RuntimeManagerClient::new(&config.runtime_manager_url).map_err(|err| {
        DeployError::Config(ConfigError::Invalid {
            name: "RUNTIME_MANAGER_URL",
            reason: err.to_string(),
        })
    })?;

    let token = iam.fetch_token().await.map_err(|err| {
        report_auth_failure(&err);
        DeployError::Auth(err)
    })?;

    let request = build_deploy_request(&manifest, &config.storage, &config.pipeline);
    if config.verbose {
        if let Ok(body) = request.to_json() {
            debug!(%body, "deploy run request data");
        }
    }

    let result = manager
        .submit_deploy(manifest.kind, &request, &token)
        .await
        .map_err(|err| {
            report_remote_failure("error starting self-hosted deploy run", &err);
            DeployError::Submit(err)
        })?;
    info!(
        run_id = %result.run_id,
        run_type = %result.run_type,
        tasks = result.tasks.len(),
        "run {} successfully created with ID: {}",
        result.run_type,
        result.run_id
    );
    for task in &result.tasks {
        debug!(task = %task.id, "run task");
    }

    let skipped = config.skip_deploy && check_skippable(&manager, &result.run_id, &token).await?;
    publish_run_outputs(sink, &result, skipped)?;

    if skipped {
        return Ok(DeployOutcome::Skipped(result));
    }
    if !options.wait {
        return Ok(DeployOutcome::Submitted(result));
    }

    let mut poller = StatusPoller::new(&manager, &iam, token, config.poll);
    poller.wait_until_running(&result.run_id, cancel).await?;
    Ok(DeployOutcome::Running(result))
}

/// `true` when the runtime manager answered 423 Locked, i.e. the run had no
/// changes and was skipped.
pub async fn check_skippable(
    manager: &RuntimeManagerClient,
    run_id: &str,
    token: &AccessToken,
) -> Result<bool, DeployError> {
    info!(run_id, "checking whether the deploy can be skipped");
    match manager.skip_deploy(run_id, token).await {
        Ok(SkipOutcome::Skipped) => {
            info!(run_id, "no changes detected, deploy skipped");
            Ok(true)
        }
        Ok(SkipOutcome::Proceed) => {
            info!(run_id, "changes detected, deploy continues");
            Ok(false)
        }
        Err(err) => {
            let detail = err.remote_detail().unwrap_or_else(|| err.to_string());
            error!(
                run_id,
                status = ?err.status(),
                %detail,
                "unexpected response from skip-deploy"
            );
            Err(DeployError::SkipCheck(err))
        }
    }
}

/// Only a bad base URL is blamed on `IAM_BASE_URL`; anything else keeps its
/// own message.
fn iam_setup_error(err: IamError) -> DeployError {
    match err {
        IamError::InvalidBaseUrl(reason) => DeployError::Config(ConfigError::Invalid {
            name: "IAM_BASE_URL",
            reason,
        }),
        other => DeployError::Auth(other),
    }
}

fn report_auth_failure(err: &IamError) {
    match err {
        IamError::Rejected {
            status,
            reason,
            body,
        } => error!(
            status = status.as_u16(),
            reason = %reason,
            response = %body,
            "error during IAM authentication"
        ),
        IamError::MissingToken { body } => error!(
            response = %body,
            "access token not found in the response"
        ),
        other => error!(error = %other, "error during IAM authentication"),
    }
}

fn report_remote_failure(what: &str, err: &ManagerError) {
    match err {
        ManagerError::UnexpectedStatus {
            status,
            reason,
            body,
        } => error!(
            status = status.as_u16(),
            reason = %reason,
            response = %body,
            "{what}"
        ),
        ManagerError::Decode {
            status,
            body,
            source,
        } => error!(
            status = status.as_u16(),
            error = %source,
            response = %body,
            "{what}"
        ),
        other => error!(error = %other, "{what}"),
    }
}
