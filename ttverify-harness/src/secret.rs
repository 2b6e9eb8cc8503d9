//! Per-run session secret.

use std::fmt;

const SECRET_BYTES: usize = 16;

/// Random token shared with the service at launch.
///
/// Only [`expose`](Self::expose) yields the value; formatting prints a
/// placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceSecret(String);

impl ServiceSecret {
    /// 16 random bytes rendered as lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; SECRET_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The `--session-secret=<hex>` startup argument.
    pub fn launch_arg(&self) -> String {
        format!("--session-secret={}", self.0)
    }
}

impl fmt::Debug for ServiceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceSecret([redacted])")
    }
}

impl fmt::Display for ServiceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}
