//! Black-box acceptance harness for the TinyTorrent daemon.
//!
//! The harness launches the daemon, discovers the port it bound and runs a
//! fixed sequence of scenarios against its RPC and WebSocket surfaces:
//!
//! - [`supervisor`]: launch with a session secret and isolated state
//!   directory, drain output, guaranteed teardown
//! - [`discovery`]: race log announcements and `connection.json` for the port
//! - [`scenario`]: capability, origin lock, structured error and push channel
//!   checks, run fail-fast
//! - [`config`] and [`report`]: command line and console output for the
//!   `ttverify` binary

pub mod config;
pub mod discovery;
pub mod error;
pub mod output_log;
pub mod report;
pub mod scenario;
pub mod secret;
pub mod supervisor;

pub use config::HarnessConfig;
pub use discovery::{ConnectionDescriptor, DiscoveryOptions, Signal, discover};
pub use error::HarnessError;
pub use output_log::OutputLog;
pub use scenario::{
    OriginPolicy, Outcome, Scenario, ScenarioConfig, ScenarioContext, ScenarioReport, run_all,
};
pub use secret::ServiceSecret;
pub use supervisor::{LaunchSpec, ProcessState, ServiceProcess};
