//! Harness error types.

use std::process::ExitStatus;
use std::time::Duration;

use ttverify_client::ClientError;

/// Fatal conditions that end a harness run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The service binary could not be started.
    #[error("failed to launch {program}: {error}")]
    LaunchFailure {
        program: String,
        error: std::io::Error,
    },

    /// The service exited before announcing a port.
    #[error("service exited before announcing a port ({status})")]
    ProcessExited { status: ExitStatus },

    /// No discovery signal arrived before the deadline.
    #[error("no port discovered within {0:?}")]
    DiscoveryTimeout(Duration),

    /// An RPC or streaming call failed below the assertion level.
    #[error("{scenario}: {error}")]
    Client {
        scenario: &'static str,
        error: ClientError,
    },

    /// A scenario's expectation was not met.
    #[error("{scenario}: {expectation}")]
    Assertion {
        scenario: &'static str,
        expectation: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    pub fn assertion(scenario: &'static str, expectation: impl Into<String>) -> Self {
        HarnessError::Assertion {
            scenario,
            expectation: expectation.into(),
        }
    }

    /// Name of the scenario that raised this error, if any.
    pub fn scenario(&self) -> Option<&'static str> {
        match self {
            HarnessError::Client { scenario, .. } | HarnessError::Assertion { scenario, .. } => {
                Some(scenario)
            }
            _ => None,
        }
    }
}
