//! Asynchronous client for the runtime manager deploy APIs.
//!
//! Consumed by the `deploy-trigger` CI step and its tests. Covers the
//! client-credentials token exchange, deploy submission, the skip-deploy
//! check and run-status queries. Callers own the token and pass it per call.

pub mod iam;
pub mod model;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub use iam::{AccessToken, Credentials, IamClient, IamError, TokenSource, DEFAULT_IAM_BASE_URL};
pub use model::{DeployKind, DeployResult, RunStatus, RunStatusReport, RunTask, SkipOutcome};

pub const DEFAULT_RUNTIME_MANAGER_URL: &str = "https://runtime-manager.v1.stackspot.com/v2";

#[derive(Debug, Clone)]
pub struct RuntimeManagerClient {
    http: Client,
    base_url: Url,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} reason={reason} body={body}")]
    UnexpectedStatus {
        status: StatusCode,
        reason: String,
        body: String,
    },
    #[error("undecodable response: status={status} error={source} body={body}")]
    Decode {
        status: StatusCode,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ManagerError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ManagerError::UnexpectedStatus { status, .. } | ManagerError::Decode { status, .. } => {
                Some(*status)
            }
            ManagerError::Http(err) => err.status(),
            ManagerError::Config(_) => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(StatusCode::FORBIDDEN)
    }

    /// Structured `status`/`details` from a JSON error body, falling back to
    /// the raw text when the body is not JSON.
    pub fn remote_detail(&self) -> Option<String> {
        let ManagerError::UnexpectedStatus { body, .. } = self else {
            return None;
        };

        #[derive(Deserialize)]
        struct ErrorBody {
            status: Option<Value>,
            details: Option<Value>,
        }

        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if parsed.status.is_some() || parsed.details.is_some() => Some(format!(
                "status={} details={}",
                parsed.status.map(render_value).unwrap_or_else(|| "-".into()),
                parsed.details.map(render_value).unwrap_or_else(|| "-".into()),
            )),
            _ => Some(body.clone()),
        }
    }
}

impl RuntimeManagerClient {
    pub fn new(base_url: &str) -> Result<Self, ManagerError> {
        let base_url = parse_base_url(base_url).map_err(ManagerError::Config)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ManagerError::Config(err.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, ManagerError> {
        self.base_url
            .join(path)
            .map_err(|err| ManagerError::Config(format!("invalid runtime manager path '{path}': {err}")))
    }

    /// Start a self-hosted deploy run. Success is exactly HTTP 201.
    pub async fn submit_deploy<B>(
        &self,
        kind: DeployKind,
        body: &B,
        token: &AccessToken,
    ) -> Result<DeployResult, ManagerError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(&format!("run/self-hosted/deploy/{}", kind.path_segment()))?;
        info!(%kind, "deploying self-hosted");
        let res = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(body)
            .send()
            .await?;

        if res.status() != StatusCode::CREATED {
            return Err(unexpected(res).await);
        }
        decode(res).await
    }

    /// Ask the runtime manager to skip a run with no changes. 423 Locked means
    /// it was skipped; any other success means the run goes ahead.
    pub async fn skip_deploy(
        &self,
        run_id: &str,
        token: &AccessToken,
    ) -> Result<SkipOutcome, ManagerError> {
        let url = self.url(&format!("run/self-hosted/skip-deploy/{run_id}"))?;
        let res = self
            .http
            .patch(url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::LOCKED {
            return Ok(SkipOutcome::Skipped);
        }
        if status.is_success() {
            debug!(run_id, %status, "run not skippable");
            return Ok(SkipOutcome::Proceed);
        }
        Err(unexpected(res).await)
    }

    pub async fn run_status(
        &self,
        run_id: &str,
        token: &AccessToken,
    ) -> Result<RunStatusReport, ManagerError> {
        let url = self.url(&format!("run/run-status/{run_id}"))?;
        let res = self
            .http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        if res.status() != StatusCode::OK {
            return Err(unexpected(res).await);
        }
        decode(res).await
    }
}

/// Decode a success body, keeping the raw text when it does not match.
async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ManagerError> {
    let status = res.status();
    let body = res.text().await?;
    serde_json::from_str(&body).map_err(|source| ManagerError::Decode {
        status,
        body,
        source,
    })
}

/// Error bodies are best effort; the status is what matters.
async fn unexpected(res: Response) -> ManagerError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    ManagerError::UnexpectedStatus {
        status,
        reason: reason_phrase(status),
        body,
    }
}

pub(crate) fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("unknown").to_string()
}

/// Parse a base URL so that `join` appends to its path instead of replacing
/// the last segment.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized).map_err(|err| format!("invalid base url '{trimmed}': {err}"))
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
