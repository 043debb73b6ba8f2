//! The traversal engine: configuration, crawl state, and the engine itself.

pub mod crawler;
pub mod cursor;

pub use crawler::TraversalEngine;
pub use cursor::{FolderPolicy, TraversalCursor};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed waits around page mutations. Timeouts are constants, not adaptive.
#[derive(Debug, Clone)]
pub struct SettleTimings {
    /// Wait after a color selection before trusting the render.
    pub color_settle: Duration,
    /// Wait after a layer selection before rescanning.
    pub layer_settle: Duration,
    /// Wait after an item selection before rescanning.
    pub item_settle: Duration,
    /// Poll interval while waiting for an emitted render.
    pub observe_poll: Duration,
    /// Maximum render observation polls per unit of work.
    pub observe_attempts: u32,
    /// Pacing delay between traversal steps.
    pub step_pace: Duration,
}

impl Default for SettleTimings {
    fn default() -> Self {
        Self {
            color_settle: Duration::from_millis(1500),
            layer_settle: Duration::from_millis(2000),
            item_settle: Duration::from_millis(1000),
            observe_poll: Duration::from_millis(250),
            observe_attempts: 8,
            step_pace: Duration::from_millis(100),
        }
    }
}

impl SettleTimings {
    /// Zero-wait timings. Scripted pages settle instantly, so tests use
    /// this to run the full state machine without wall-clock delays.
    pub fn instant() -> Self {
        Self {
            color_settle: Duration::ZERO,
            layer_settle: Duration::ZERO,
            item_settle: Duration::ZERO,
            observe_poll: Duration::ZERO,
            observe_attempts: 2,
            step_pace: Duration::ZERO,
        }
    }
}

/// Inputs to a crawl session.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Identifier of the generator instance, when derivable from the page
    /// URL. Without it, captures fall back to `fallback_folder`.
    pub maker_id: Option<String>,
    /// Advance across items after exhausting each one.
    pub auto_advance: bool,
    /// Destination folder used when no maker hierarchy is detected.
    pub fallback_folder: String,
    pub timings: SettleTimings,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            maker_id: None,
            auto_advance: false,
            fallback_folder: "AutoCaptured".to_string(),
            timings: SettleTimings::default(),
        }
    }
}

/// Engine states. The crawl is a sequential chain through these; `status()`
/// reports the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlState {
    Idle,
    ScanningLayers,
    IteratingColors,
    AdvancingLayer,
    AdvancingItem,
    Done,
}

impl std::fmt::Display for CrawlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ScanningLayers => write!(f, "scanning layers"),
            Self::IteratingColors => write!(f, "iterating colors"),
            Self::AdvancingLayer => write!(f, "advancing layer"),
            Self::AdvancingItem => write!(f, "advancing item"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Point-in-time view of a crawl.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStatus {
    pub state: CrawlState,
    pub captures: u64,
    pub anomalies: u64,
    pub items_visited: u64,
}

/// End-of-session accounting.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub captures: u64,
    pub anomalies: u64,
    pub items_visited: u64,
    pub elapsed_ms: u64,
}

/// How a crawl ended.
#[derive(Debug, Clone)]
pub enum CrawlOutcome {
    /// Every reachable combination was processed.
    Completed(CrawlSummary),
    /// Cancelled cooperatively at a suspension boundary.
    Cancelled(CrawlSummary),
    /// Another crawl owns this engine; this call was a no-op.
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_state_display() {
        assert_eq!(CrawlState::Idle.to_string(), "idle");
        assert_eq!(CrawlState::IteratingColors.to_string(), "iterating colors");
        assert_eq!(CrawlState::Done.to_string(), "done");
    }

    #[test]
    fn test_default_config() {
        let config = CrawlConfig::default();
        assert_eq!(config.fallback_folder, "AutoCaptured");
        assert!(!config.auto_advance);
        assert_eq!(config.timings.color_settle, Duration::from_millis(1500));
        assert_eq!(config.timings.observe_attempts, 8);
    }
}
