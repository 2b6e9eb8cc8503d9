//! Verification scenarios.
//!
//! Each [`Scenario`] is an independent check against the running service. The
//! runner executes them in order against a single instance and stops at the
//! first failure.

mod capabilities;
mod origin_lock;
mod sync_sequence;
mod torrent_errors;

#[cfg(test)]
pub(crate) mod fake_service;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use http::StatusCode;
use tracing::Instrument;
use ttverify_client::{ClientError, DEFAULT_ORIGIN, RpcClient, RpcResponse, StreamOptions};

use crate::error::HarnessError;
use crate::report;
use crate::secret::ServiceSecret;

pub const DEFAULT_FOREIGN_ORIGIN: &str = "http://evil-site.com";
pub const DEFAULT_EXPECTED_VERSION: &str = "TinyTorrent 1.1.0";
pub const DEFAULT_EXPECTED_CLASS: &str = "tinytorrent";
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Scenario {
    /// `tt-get-capabilities` reports the expected product and class.
    Capabilities,
    /// A foreign `Origin` is refused.
    OriginLock,
    /// `torrent-add` failures carry structured error codes.
    TorrentErrors,
    /// The push channel delivers a sequenced `sync-patch`.
    SyncSequence,
}

impl Scenario {
    /// Run order.
    pub const ALL: [Scenario; 4] = [
        Scenario::Capabilities,
        Scenario::OriginLock,
        Scenario::TorrentErrors,
        Scenario::SyncSequence,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Scenario::Capabilities => "capabilities",
            Scenario::OriginLock => "origin-lock",
            Scenario::TorrentErrors => "torrent-errors",
            Scenario::SyncSequence => "sync-sequence",
        }
    }

    pub async fn run(self, ctx: &ScenarioContext) -> Result<Outcome, HarnessError> {
        match self {
            Scenario::Capabilities => capabilities::run(ctx).await,
            Scenario::OriginLock => origin_lock::run(ctx).await,
            Scenario::TorrentErrors => torrent_errors::run(ctx).await,
            Scenario::SyncSequence => sync_sequence::run(ctx).await,
        }
    }
}

/// How a foreign origin that is let through should be judged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Anything but 403 fails.
    Strict,
    /// A 200 is reported as a warning; debug builds skip the origin check.
    #[default]
    Permissive,
}

/// Expectations shared by all scenarios.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub trusted_origin: String,
    pub foreign_origin: String,
    pub origin_policy: OriginPolicy,
    pub expect_version: String,
    pub expect_class: String,
    pub stream_timeout: Duration,
    /// The service's state root; scenarios may create files under it.
    pub state_dir: PathBuf,
}

impl ScenarioConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            trusted_origin: DEFAULT_ORIGIN.to_string(),
            foreign_origin: DEFAULT_FOREIGN_ORIGIN.to_string(),
            origin_policy: OriginPolicy::default(),
            expect_version: DEFAULT_EXPECTED_VERSION.to_string(),
            expect_class: DEFAULT_EXPECTED_CLASS.to_string(),
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            state_dir: state_dir.into(),
        }
    }
}

/// Everything a scenario needs to reach the service.
#[derive(Debug)]
pub struct ScenarioContext {
    pub host: String,
    pub port: u16,
    pub secret: ServiceSecret,
    pub rpc: RpcClient,
    pub config: ScenarioConfig,
}

impl ScenarioContext {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        secret: ServiceSecret,
        config: ScenarioConfig,
    ) -> Self {
        let host = host.into();
        let rpc = RpcClient::new(host.clone(), port, secret.expose())
            .origin(config.trusted_origin.clone());
        Self {
            host,
            port,
            secret,
            rpc,
            config,
        }
    }

    /// Replace the RPC client's per-call deadline.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc = self.rpc.timeout(timeout);
        self
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::new(self.host.clone(), self.port, self.secret.expose())
            .origin(self.config.trusted_origin.clone())
    }
}

/// Result of a scenario that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// One note per check performed.
    Pass(Vec<String>),
    /// Tolerated deviation; does not fail the run.
    Warn(String),
}

#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcome: Outcome,
    pub duration: Duration,
}

/// Run `scenarios` in order, stopping at the first failure.
///
/// Each result is printed as soon as it is known.
pub async fn run_all(
    ctx: &ScenarioContext,
    scenarios: &[Scenario],
    verbose: bool,
) -> Result<Vec<ScenarioReport>, HarnessError> {
    let mut reports = Vec::with_capacity(scenarios.len());
    for &scenario in scenarios {
        let start = Instant::now();
        let result = scenario
            .run(ctx)
            .instrument(tracing::info_span!("scenario", name = scenario.name()))
            .await;
        let duration = start.elapsed();

        match result {
            Ok(outcome) => {
                let report = ScenarioReport {
                    scenario,
                    outcome,
                    duration,
                };
                report::print_report(&report, verbose);
                reports.push(report);
            }
            Err(err) => {
                report::print_failure(scenario, duration, &err);
                return Err(err);
            }
        }
    }
    Ok(reports)
}

/// Wrap a client error with the scenario it interrupted.
fn client_error(scenario: Scenario) -> impl FnOnce(ClientError) -> HarnessError {
    move |error| HarnessError::Client {
        scenario: scenario.name(),
        error,
    }
}

fn expect_status(
    scenario: Scenario,
    response: &RpcResponse,
    expected: StatusCode,
) -> Result<(), HarnessError> {
    if response.status == expected {
        return Ok(());
    }
    Err(HarnessError::assertion(
        scenario.name(),
        format!(
            "expected status {}, got {} (body: {})",
            expected.as_u16(),
            response.status.as_u16(),
            response.body
        ),
    ))
}
