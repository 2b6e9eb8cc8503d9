//! TinyTorrent acceptance harness.
//!
//! Launches the daemon as a black box, finds its RPC port and checks its
//! security and protocol contracts.
//!
//! # Usage
//!
//! ```bash
//! # Run every scenario
//! ttverify --binary ./buildstate/debug/tinytorrent-daemon
//!
//! # Treat an accepted foreign origin as a failure
//! ttverify --binary ./tinytorrent-daemon --strict-origin
//!
//! # Run a single scenario with per-check output
//! TT_BACKEND_BINARY=./tinytorrent-daemon ttverify --only sync-sequence -v
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use ttverify_harness::report;
use ttverify_harness::{
    HarnessConfig, LaunchSpec, ScenarioContext, ScenarioReport, ServiceProcess, ServiceSecret,
    discover, run_all,
};

/// Service output lines shown after a failed run.
const TAIL_LINES: usize = 20;

#[tokio::main]
async fn main() -> ExitCode {
    let config = HarnessConfig::parse();
    init_tracing(config.verbose);

    report::print_header("TinyTorrent Acceptance Tests");

    match run(&config).await {
        Ok(reports) => {
            report::print_summary(&reports);
            ExitCode::SUCCESS
        }
        Err(err) => {
            report::print_abort(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: &HarnessConfig) -> anyhow::Result<Vec<ScenarioReport>> {
    // The temporary directory, if any, lives until the service is gone.
    let (state_dir, _temp) = state_dir(config)?;

    let spec = LaunchSpec {
        args: config.service_args.clone(),
        ..LaunchSpec::new(&config.binary, ServiceSecret::generate(), &state_dir)
    };
    tracing::info!("launching service with session secret");
    let mut process = ServiceProcess::launch(&spec)?;

    let result = exercise(config, &spec, &mut process).await;

    match process.shutdown(config.shutdown_grace()).await {
        Ok(state) => tracing::debug!(?state, "teardown complete"),
        Err(e) => tracing::error!(error = %e, "failed to stop service"),
    }
    if result.is_err() {
        report::print_service_tail(&process.output().tail(TAIL_LINES));
    }
    result
}

async fn exercise(
    config: &HarnessConfig,
    spec: &LaunchSpec,
    process: &mut ServiceProcess,
) -> anyhow::Result<Vec<ScenarioReport>> {
    let endpoint = discover(process, &config.discovery_options(spec.state_file())).await?;
    tracing::info!(port = endpoint.port.get(), "detected RPC port");

    let ctx = ScenarioContext::new(
        config.host.clone(),
        endpoint.port.get(),
        spec.secret.clone(),
        config.scenario_config(spec.state_dir.clone()),
    )
    .rpc_timeout(config.rpc_timeout());

    Ok(run_all(&ctx, &config.scenarios(), config.verbose).await?)
}

/// The configured state directory, or a fresh temporary one.
fn state_dir(config: &HarnessConfig) -> anyhow::Result<(PathBuf, Option<TempDir>)> {
    match &config.state_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating state directory {}", dir.display()))?;
            Ok((dir.clone(), None))
        }
        None => {
            let temp = tempfile::Builder::new()
                .prefix("TinyTorrent-acceptance-")
                .tempdir()
                .context("creating temporary state directory")?;
            Ok((temp.path().to_path_buf(), Some(temp)))
        }
    }
}
