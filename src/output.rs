//! Operator-facing output channel.
//!
//! Every command reports one human-readable progress line. Those lines go to
//! an injected [`OutputSink`] rather than straight to stdout so that tests and
//! embedding applications can capture them. Diagnostic logging goes through
//! `tracing` and is unrelated to this channel.

use std::sync::{Arc, Mutex};

/// Destination for progress and status lines.
pub trait OutputSink: Send + Sync {
    /// Emit one line of operator-facing text.
    fn line(&self, text: &str);
}

/// Writes every line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn line(&self, text: &str) {
        println!("{}", text);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn line(&self, _text: &str) {}
}

/// Buffers lines in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CaptureSink {
    /// Create an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the captured lines.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl OutputSink for CaptureSink {
    fn line(&self, text: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_sink_shares_buffer() {
        let sink = CaptureSink::new();
        let handle = sink.clone();
        sink.line("Initializing temp_ctrl...");
        sink.line("LOG: ready");

        assert_eq!(handle.lines().len(), 2);
        assert!(handle.contains("LOG: ready"));
        assert!(!handle.contains("missing"));
    }
}
