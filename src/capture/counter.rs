//! Per-path monotonic sequence numbers for captured files.
//!
//! Counters are process-wide and session-scoped: they live for one crawl
//! and are not durable unless explicitly reloaded.

use std::collections::HashMap;

/// Maps destination paths to their next sequence number.
#[derive(Debug, Default)]
pub struct DownloadCounterStore {
    counters: HashMap<String, u32>,
}

impl DownloadCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sequence number for the next capture at `path`: 1 on first use,
    /// the stored value otherwise. Increments the stored value as a side
    /// effect, so a number is never handed out twice for the same path.
    pub fn next_sequence(&mut self, path: &str) -> u32 {
        let entry = self.counters.entry(path.to_string()).or_insert(1);
        let seq = *entry;
        *entry += 1;
        seq
    }

    /// Clear one path's counter (on fresh Item start), or every counter
    /// when `path` is `None`.
    pub fn reset(&mut self, path: Option<&str>) {
        match path {
            Some(p) => {
                self.counters.remove(p);
            }
            None => self.counters.clear(),
        }
    }

    /// Number of distinct paths that have been numbered this session.
    pub fn paths(&self) -> usize {
        self.counters.len()
    }
}
