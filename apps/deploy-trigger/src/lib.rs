//! Deploy trigger for self-hosted runtime manager runs.
//!
//! Reads the step configuration and the `manifest.yaml` next to the action,
//! submits the deploy, optionally asks the runtime manager to skip a no-op
//! run, publishes the run outputs and waits for the run to start.

pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod output;
pub mod poller;
pub mod request;
pub mod telemetry;

pub use config::{ConfigError, DeployConfig};
pub use error::DeployError;
pub use manifest::{Manifest, ManifestError};
pub use orchestrator::{check_skippable, run, DeployOutcome, RunOptions};
pub use output::{GithubOutputFile, InMemoryOutputSink, LogOutputSink, OutputSink};
pub use poller::{PollError, PollSettings, PollStep, StatusPoller};
pub use request::{build_deploy_request, DeployRequest, Overlay};
