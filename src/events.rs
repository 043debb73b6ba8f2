// Copyright 2026 Colorloop Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl event bus — typed telemetry from the traversal engine.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`CrawlEvent`] values. Any consumer — the CLI progress printer, a log
//! file, a test harness — can subscribe independently. When no subscribers
//! exist, events are silently dropped (zero overhead).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the crawl emits. Serialized to JSON for logs and tooling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CrawlEvent {
    /// A crawl has started.
    CrawlStarted {
        crawl_id: String,
        maker_id: Option<String>,
        auto_advance: bool,
        item_count: usize,
        timestamp: String,
    },
    /// An item activation began.
    ItemStarted {
        crawl_id: String,
        item: String,
        ordinal: usize,
        total: usize,
    },
    /// A layer activation began within the current item.
    LayerStarted {
        crawl_id: String,
        layer: String,
        ordinal: usize,
        total: usize,
    },
    /// A selection was applied and verified on the page. This is the single
    /// "selection changed" notification every consumer sees, regardless of
    /// which level (item, layer, color) changed.
    SelectionChanged {
        crawl_id: String,
        target: String,
        level: SelectionLevel,
    },
    /// A unit of work was handed to the capture sink.
    Captured {
        crawl_id: String,
        destination: String,
        sequence: u32,
        resource_url: String,
    },
    /// A non-fatal anomaly: a selection that never verified, a render that
    /// never appeared. The traversal continues past these.
    Anomaly { crawl_id: String, detail: String },
    /// The crawl finished every reachable combination.
    CrawlComplete {
        crawl_id: String,
        captures: u64,
        anomalies: u64,
        items_visited: u64,
        elapsed_ms: u64,
    },
    /// The crawl was cancelled cooperatively.
    CrawlCancelled {
        crawl_id: String,
        captures: u64,
        anomalies: u64,
    },
    /// The crawl aborted with a fatal error.
    CrawlFailed { crawl_id: String, error: String },
}

/// Which level of the hierarchy a selection change applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionLevel {
    Item,
    Layer,
    Color,
}

impl std::fmt::Display for SelectionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item => write!(f, "item"),
            Self::Layer => write!(f, "layer"),
            Self::Color => write!(f, "color"),
        }
    }
}

/// The central event bus for a crawl session.
///
/// All components emit events through this bus. Consumers subscribe to
/// receive a stream of all events.
pub struct EventBus {
    sender: broadcast::Sender<CrawlEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: CrawlEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Epoch-seconds timestamp for event logs.
pub fn now_timestamp() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", dur.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CrawlEvent::Captured {
            crawl_id: "crawl-1".to_string(),
            destination: "Maker_12345/Hair/FF0000".to_string(),
            sequence: 3,
            resource_url: "https://cdn.example.com/render.png".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Captured"));
        assert!(json.contains("Maker_12345/Hair/FF0000"));

        // Roundtrip
        let parsed: CrawlEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            CrawlEvent::Captured { sequence, .. } => assert_eq!(sequence, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        // Should not panic when no subscribers
        bus.emit(CrawlEvent::CrawlFailed {
            crawl_id: "crawl-1".to_string(),
            error: "no items".to_string(),
        });
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(CrawlEvent::ItemStarted {
            crawl_id: "crawl-1".to_string(),
            item: "Eyes".to_string(),
            ordinal: 0,
            total: 4,
        });

        let event = rx.try_recv().unwrap();
        match event {
            CrawlEvent::ItemStarted { item, .. } => assert_eq!(item, "Eyes"),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn test_event_bus_async_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(CrawlEvent::Anomaly {
            crawl_id: "crawl-1".to_string(),
            detail: "layer unreachable".to_string(),
        });
        let event = tokio_test::block_on(rx.recv()).unwrap();
        match event {
            CrawlEvent::Anomaly { detail, .. } => assert_eq!(detail, "layer unreachable"),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn test_selection_level_display() {
        assert_eq!(SelectionLevel::Item.to_string(), "item");
        assert_eq!(SelectionLevel::Color.to_string(), "color");
    }
}
