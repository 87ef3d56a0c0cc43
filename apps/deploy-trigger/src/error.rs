use runtime_manager_sdk::{IamError, ManagerError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::output::OutputError;
use crate::poller::PollError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("authentication failed: {0}")]
    Auth(#[from] IamError),
    #[error("error starting self-hosted deploy run: {0}")]
    Submit(#[source] ManagerError),
    #[error("skip-deploy check failed: {0}")]
    SkipCheck(#[source] ManagerError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("failed to publish outputs: {0}")]
    Output(#[from] OutputError),
}

impl DeployError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployError::Poll(PollError::Cancelled) => 130,
            _ => 1,
        }
    }
}
