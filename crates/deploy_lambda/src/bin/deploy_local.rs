use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use deploy_core::contract::manifest_fingerprint;
use deploy_lambda::adapters::aws::AwsControlPlane;
use deploy_lambda::config::{
    LogFormat, ReconcilerConfig, LOG_FORMAT_ENV, POLL_INTERVAL_ENV, POLL_MAX_ATTEMPTS_ENV,
};
use deploy_lambda::handlers::deploy::serve_deploy_event;
use deploy_lambda::manifest_file::{directory_name, find_manifest, load_manifest};
use deploy_lambda::reconcile::prepare_manifest;
use deploy_lambda::telemetry;
use deploy_lambda::wait::{WaitPolicy, DEFAULT_POLL_MAX_ATTEMPTS};
use serde_json::json;

/// Deploys the manifest in the current directory against the configured AWS
/// account and prints the handler response.
#[derive(Parser, Debug)]
#[command(name = "deploy_local")]
struct Cli {
    /// Manifest file; defaults to manifest.toml or manifest.json in the
    /// current directory.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Print the normalized manifest and exit without touching roles or
    /// functions.
    #[arg(long)]
    validate_only: bool,

    #[arg(long, env = POLL_INTERVAL_ENV, default_value_t = 2000)]
    poll_interval_ms: u64,

    #[arg(long, env = POLL_MAX_ATTEMPTS_ENV, default_value_t = DEFAULT_POLL_MAX_ATTEMPTS)]
    poll_max_attempts: u32,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format)?;

    let working_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let manifest_path = match cli.manifest {
        Some(path) => path,
        None => find_manifest(&working_dir)?,
    };
    let raw = load_manifest(&manifest_path)?;
    let fallback_name = directory_name(&working_dir);
    let plane = AwsControlPlane::load().await;

    if cli.validate_only {
        let manifest = prepare_manifest(raw, fallback_name, &plane)?;
        let output = json!({
            "manifest_fingerprint": manifest_fingerprint(&manifest)?,
            "manifest": manifest,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = ReconcilerConfig {
        wait: WaitPolicy {
            interval: Duration::from_millis(cli.poll_interval_ms),
            max_attempts: cli.poll_max_attempts.max(1),
        },
        log_format: cli.log_format,
    };
    let event = json!({ "body": serde_json::to_value(&raw)? });
    let response = serve_deploy_event(event, fallback_name, &plane, &config).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status_code == 200 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
