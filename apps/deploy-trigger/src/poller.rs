//! Run-status polling.
//!
//! `PROCESSING_REQUEST` waits one interval and asks again, `RUNNING` ends the
//! loop, anything else is a failed run. A 403 swaps in a fresh token and
//! repeats the same query; more than `max_token_refreshes` in a row aborts.

use std::time::Duration;

use runtime_manager_sdk::{
    AccessToken, IamError, ManagerError, RunStatus, RunStatusReport, RunTask,
    RuntimeManagerClient, TokenSource,
};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_TOKEN_REFRESHES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// No ceiling when `None`; the surrounding pipeline timeout applies.
    pub max_wait: Option<Duration>,
    pub max_token_refreshes: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            max_token_refreshes: MAX_TOKEN_REFRESHES,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("run status still forbidden after {0} token refreshes")]
    ForbiddenExhausted(u32),
    #[error("token refresh failed: {0}")]
    Refresh(#[from] IamError),
    #[error("error getting run status: {0}")]
    Status(#[from] ManagerError),
    #[error("run {run_id} failed with status {status}")]
    RunFailed {
        run_id: String,
        status: RunStatus,
        failed_tasks: Vec<RunTask>,
    },
    #[error("run {run_id} still processing after {waited:?}")]
    DeadlineExceeded { run_id: String, waited: Duration },
    #[error("polling cancelled")]
    Cancelled,
}

/// Result of a single status query.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    Pending,
    TokenRefreshed,
    Running(RunStatusReport),
}

pub struct StatusPoller<'a> {
    client: &'a RuntimeManagerClient,
    tokens: &'a dyn TokenSource,
    settings: PollSettings,
    token: AccessToken,
    consecutive_forbidden: u32,
}

impl<'a> StatusPoller<'a> {
    pub fn new(
        client: &'a RuntimeManagerClient,
        tokens: &'a dyn TokenSource,
        token: AccessToken,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            tokens,
            settings,
            token,
            consecutive_forbidden: 0,
        }
    }

    /// Token currently in use, including any refreshed one.
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub async fn poll_once(&mut self, run_id: &str) -> Result<PollStep, PollError> {
        let report = match self.client.run_status(run_id, &self.token).await {
            Ok(report) => report,
            Err(err) if err.is_forbidden() => {
                self.consecutive_forbidden += 1;
                if self.consecutive_forbidden > self.settings.max_token_refreshes {
                    error!(
                        run_id,
                        refreshes = self.settings.max_token_refreshes,
                        "forbidden after token refreshes, giving up"
                    );
                    return Err(PollError::ForbiddenExhausted(
                        self.settings.max_token_refreshes,
                    ));
                }
                warn!(
                    run_id,
                    attempt = self.consecutive_forbidden,
                    "forbidden, refreshing token"
                );
                self.token = self.tokens.acquire_token().await?;
                return Ok(PollStep::TokenRefreshed);
            }
            Err(err) => return Err(err.into()),
        };

        self.consecutive_forbidden = 0;
        match report.status {
            RunStatus::ProcessingRequest => Ok(PollStep::Pending),
            RunStatus::Running => Ok(PollStep::Running(report)),
            RunStatus::Other(ref status) => {
                error!(run_id, %status, "there were some problems with the deployment request");
                for task in report.failed_tasks() {
                    error!(
                        task = %task.id,
                        error = task.failure().unwrap_or_default(),
                        "task failed"
                    );
                }
                let failed_tasks = report.failed_tasks().cloned().collect();
                Err(PollError::RunFailed {
                    run_id: run_id.to_string(),
                    status: report.status.clone(),
                    failed_tasks,
                })
            }
        }
    }

    /// Poll until the run leaves `PROCESSING_REQUEST`. The wait between polls
    /// ends early when `cancel` fires.
    pub async fn wait_until_running(
        &mut self,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunStatusReport, PollError> {
        info!(run_id, "awaiting validation of the deployment request");
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(PollError::Cancelled);
            }
            match self.poll_once(run_id).await? {
                PollStep::Running(report) => {
                    info!(run_id, "validation completed successfully");
                    return Ok(report);
                }
                PollStep::TokenRefreshed => continue,
                PollStep::Pending => {
                    let waited = started.elapsed();
                    if let Some(max_wait) = self.settings.max_wait {
                        if waited >= max_wait {
                            return Err(PollError::DeadlineExceeded {
                                run_id: run_id.to_string(),
                                waited,
                            });
                        }
                    }
                    debug!(run_id, ?waited, "still processing request");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(PollError::Cancelled),
                        _ = sleep(self.settings.interval) => {}
                    }
                }
            }
        }
    }
}
