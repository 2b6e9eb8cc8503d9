//! Command-line configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::discovery::{DEFAULT_DISCOVERY_TIMEOUT, DEFAULT_POLL_INTERVAL, DiscoveryOptions};
use crate::scenario::{
    DEFAULT_EXPECTED_CLASS, DEFAULT_EXPECTED_VERSION, DEFAULT_FOREIGN_ORIGIN,
    DEFAULT_STREAM_TIMEOUT, OriginPolicy, Scenario, ScenarioConfig,
};
use crate::supervisor::DEFAULT_SHUTDOWN_GRACE;

const fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Acceptance harness for the TinyTorrent daemon.
///
/// Launches the daemon with a fresh session secret in an isolated state
/// directory, discovers its RPC port and runs the verification scenarios
/// against it. Exits non-zero on the first failure.
#[derive(Parser, Debug, Clone)]
#[command(name = "ttverify", version)]
pub struct HarnessConfig {
    /// Daemon binary to launch
    #[arg(long, env = "TT_BACKEND_BINARY")]
    pub binary: PathBuf,

    /// Extra argument passed to the daemon after the session secret (repeatable)
    #[arg(long = "service-arg", allow_hyphen_values = true)]
    pub service_args: Vec<String>,

    /// State directory for the daemon [default: fresh temporary directory]
    #[arg(long, env = "TT_DATA_ROOT")]
    pub state_dir: Option<PathBuf>,

    /// Address the daemon is reached on
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// How long to wait for the daemon to announce its port
    #[arg(long, default_value_t = millis(DEFAULT_DISCOVERY_TIMEOUT))]
    pub discovery_timeout_ms: u64,

    /// Interval between discovery polls
    #[arg(long, default_value_t = millis(DEFAULT_POLL_INTERVAL))]
    pub poll_interval_ms: u64,

    /// Per-call deadline for RPC requests
    #[arg(long, default_value_t = millis(ttverify_client::DEFAULT_TIMEOUT))]
    pub rpc_timeout_ms: u64,

    /// Origin presented on trusted requests
    #[arg(long, default_value = ttverify_client::DEFAULT_ORIGIN)]
    pub origin: String,

    /// Origin that must be refused
    #[arg(long, default_value = DEFAULT_FOREIGN_ORIGIN)]
    pub foreign_origin: String,

    /// Fail, rather than warn, when the foreign origin is accepted
    #[arg(long)]
    pub strict_origin: bool,

    /// Expected `server-version` capability
    #[arg(long, default_value = DEFAULT_EXPECTED_VERSION)]
    pub expect_version: String,

    /// Expected `server-class` capability
    #[arg(long, default_value = DEFAULT_EXPECTED_CLASS)]
    pub expect_class: String,

    /// How long to wait for a sequenced sync-patch
    #[arg(long, default_value_t = millis(DEFAULT_STREAM_TIMEOUT))]
    pub stream_timeout_ms: u64,

    /// Wait between terminate and kill at teardown
    #[arg(long, default_value_t = millis(DEFAULT_SHUTDOWN_GRACE))]
    pub shutdown_grace_ms: u64,

    /// Run only these scenarios (repeatable), in standard order
    #[arg(long, value_enum)]
    pub only: Vec<Scenario>,

    /// Print every check, not just failures and warnings
    #[arg(short, long)]
    pub verbose: bool,
}

impl HarnessConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        if self.strict_origin {
            OriginPolicy::Strict
        } else {
            OriginPolicy::Permissive
        }
    }

    /// Selected scenarios in run order.
    pub fn scenarios(&self) -> Vec<Scenario> {
        Scenario::ALL
            .into_iter()
            .filter(|s| self.only.is_empty() || self.only.contains(s))
            .collect()
    }

    pub fn discovery_options(&self, state_file: PathBuf) -> DiscoveryOptions {
        DiscoveryOptions::new(state_file)
            .timeout(self.discovery_timeout())
            .poll_interval(self.poll_interval())
    }

    pub fn scenario_config(&self, state_dir: PathBuf) -> ScenarioConfig {
        ScenarioConfig {
            trusted_origin: self.origin.clone(),
            foreign_origin: self.foreign_origin.clone(),
            origin_policy: self.origin_policy(),
            expect_version: self.expect_version.clone(),
            expect_class: self.expect_class.clone(),
            stream_timeout: self.stream_timeout(),
            state_dir,
        }
    }
}
