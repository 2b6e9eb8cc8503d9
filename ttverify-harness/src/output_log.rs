//! Append-only log of service output lines.
//!
//! One drain task per output pipe appends; the discovery poller reads by
//! index. Entries are never removed, so a reader's cursor stays valid.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Debug, Default)]
pub struct OutputLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl OutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        self.lock().push(line);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines at index `cursor` and later.
    pub fn since(&self, cursor: usize) -> Vec<String> {
        let lines = self.lock();
        lines.get(cursor..).map(<[String]>::to_vec).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.since(0)
    }

    /// The last `n` lines.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lock();
        lines[lines.len().saturating_sub(n)..].to_vec()
    }

    // A panicking writer cannot leave a half-pushed Vec behind.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
