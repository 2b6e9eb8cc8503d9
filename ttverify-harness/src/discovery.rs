//! Finding the port a freshly launched service bound.
//!
//! The service picks an ephemeral port and announces it three ways, none of
//! which is guaranteed: two log phrasings and a `connection.json` file in its
//! state directory. [`discover`] polls all of them on one timer and takes the
//! first hit. A state file is only trusted when its `pid` matches the process
//! being supervised; anything else may be left over from an earlier run.

use std::num::NonZeroU16;
use std::path::{Path, PathBuf};
use std::time::Duration;

use http::Uri;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::supervisor::ServiceProcess;

/// `RPC listening on port <n>; connection info saved to <path>`
pub const LISTENING_MARKER: &str = "RPC listening on port";

/// `RPC layer ready; POST requests should hit http://<host>:<port>/transmission/rpc`
pub const POST_URL_MARKER: &str = "POST requests should hit";

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Where a port came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    ListeningLine,
    PostUrlLine,
    StateFile,
}

/// Signals in the order they are consulted on each tick.
pub const SIGNALS: [Signal; 3] = [Signal::ListeningLine, Signal::PostUrlLine, Signal::StateFile];

impl Signal {
    fn check(self, lines: &[String], state_file: &Path, pid: u32) -> Option<ConnectionDescriptor> {
        let port = match self {
            Signal::ListeningLine => lines.iter().find_map(|l| parse_listening_line(l)),
            Signal::PostUrlLine => lines.iter().find_map(|l| parse_post_url_line(l)),
            Signal::StateFile => return read_state_file(state_file, pid),
        }?;
        Some(ConnectionDescriptor {
            port,
            pid: Some(pid),
            source: self,
        })
    }
}

/// The discovered endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub port: NonZeroU16,
    pub pid: Option<u32>,
    pub source: Signal,
}

/// Port from a `RPC listening on port <n>` line.
pub fn parse_listening_line(line: &str) -> Option<NonZeroU16> {
    let (_, rest) = line.split_once(LISTENING_MARKER)?;
    let rest = rest.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .map_or(rest, |end| &rest[..end]);
    digits.parse().ok()
}

/// Port from a `POST requests should hit <url>` line.
///
/// The URL must carry an explicit port.
pub fn parse_post_url_line(line: &str) -> Option<NonZeroU16> {
    let (_, rest) = line.split_once(POST_URL_MARKER)?;
    let url = rest.split_whitespace().next()?;
    let uri: Uri = url.parse().ok()?;
    uri.scheme()?;
    NonZeroU16::new(uri.port_u16()?)
}

#[derive(Deserialize)]
struct StateRecord {
    pid: u32,
    port: u64,
}

/// Read `connection.json`, accepting it only if it belongs to `expected_pid`.
///
/// Missing, unreadable, malformed or foreign files all yield `None`.
pub fn read_state_file(path: &Path, expected_pid: u32) -> Option<ConnectionDescriptor> {
    let contents = std::fs::read(path).ok()?;
    let record: StateRecord = serde_json::from_slice(&contents).ok()?;
    if record.pid != expected_pid {
        tracing::debug!(
            path = %path.display(),
            recorded = record.pid,
            expected = expected_pid,
            "ignoring state file from another process"
        );
        return None;
    }
    let port = NonZeroU16::new(u16::try_from(record.port).ok()?)?;
    Some(ConnectionDescriptor {
        port,
        pid: Some(record.pid),
        source: Signal::StateFile,
    })
}

#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    pub state_file: PathBuf,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl DiscoveryOptions {
    pub fn new(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Poll every discovery signal until one yields a port.
///
/// Fails with [`HarnessError::ProcessExited`] as soon as the process is seen
/// to have ended, and with [`HarnessError::DiscoveryTimeout`] once the
/// deadline passes.
pub async fn discover(
    process: &mut ServiceProcess,
    options: &DiscoveryOptions,
) -> Result<ConnectionDescriptor, HarnessError> {
    let deadline = Instant::now() + options.timeout;
    let pid = process.pid();
    let mut cursor = 0;

    loop {
        if let Some(status) = process.try_exited()? {
            return Err(HarnessError::ProcessExited { status });
        }

        let fresh = process.output().since(cursor);
        cursor += fresh.len();

        if let Some(found) = SIGNALS
            .iter()
            .find_map(|signal| signal.check(&fresh, &options.state_file, pid))
        {
            tracing::info!(port = found.port.get(), source = ?found.source, "discovered service port");
            return Ok(found);
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(HarnessError::DiscoveryTimeout(options.timeout));
        }
        tokio::time::sleep(options.poll_interval.min(deadline - now)).await;
    }
}
