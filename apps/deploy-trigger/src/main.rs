use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use deploy_trigger::config::{ConfigError, DeployConfig};
use deploy_trigger::output::{GithubOutputFile, LogOutputSink, OutputSink};
use deploy_trigger::telemetry::{default_filter, init_tracing};
use deploy_trigger::{run, DeployOutcome, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "deploy-trigger", about = "Submit a self-hosted deploy and wait for it to start")]
struct Cli {
    /// Manifest to deploy instead of `$ACTION_PATH/manifest.yaml`.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Log the manifest and request payload.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Submit (and skip-check) without polling the run status.
    #[arg(long)]
    no_wait: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let verbose = cli.verbose || std::env::var_os("VERBOSE").is_some();
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter(verbose).to_string());
    init_tracing(&filter);

    let mut config = match DeployConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::Missing(names)) => {
            for name in &names {
                error!("{name} is not set");
            }
            error!("some mandatory input is empty, please check the input list");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => {
            error!("{err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    config.verbose |= cli.verbose;

    let mut sink: Box<dyn OutputSink> = match &config.output_path {
        Some(path) => Box::new(GithubOutputFile::new(path)),
        None => {
            warn!("GITHUB_OUTPUT is not set, outputs will only be logged");
            Box::new(LogOutputSink)
        }
    };
    let options = RunOptions {
        manifest_path: cli.manifest,
        wait: !cli.no_wait,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let outcome = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                on_signal.cancel();
            }
        });
        run(&config, &options, sink.as_mut(), &cancel).await
    });

    match outcome {
        Ok(outcome) => {
            let run_id = &outcome.result().run_id;
            match &outcome {
                DeployOutcome::Running(_) => {
                    info!(%run_id, "deploy validated, run is in progress")
                }
                DeployOutcome::Skipped(_) => info!(%run_id, "deploy skipped, nothing to change"),
                DeployOutcome::Submitted(_) => info!(%run_id, "deploy submitted"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("{err}");
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}
