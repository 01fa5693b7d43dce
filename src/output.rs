//! Host logging sink.
//!
//! The agent writes free-text diagnostic lines here at configuration,
//! dispatch and error points. A host (editor output channel, terminal, test)
//! decides where they end up. Appending never fails.

use std::sync::{Arc, Mutex};

use tracing::info;

/// Append-only line logger supplied by the host
pub trait OutputSink: Send + Sync {
    /// Append one line of diagnostic text
    fn append_line(&self, line: &str);
}

/// Forwards every line to `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn append_line(&self, line: &str) {
        info!(target: "superdesign::output", "{}", line);
    }
}

/// Keeps lines in memory so a host can display or inspect them later
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line appended so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Whether any appended line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for BufferSink {
    fn append_line(&self, line: &str) {
        // A poisoned buffer only loses diagnostics
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn OutputSink>;
