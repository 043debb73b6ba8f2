//! TraversalEngine: drives the crawl over the three-level hierarchy.
//!
//! The engine owns all crawl state explicitly — one instance per session.
//! Every advancement decision re-queries the page: "next" is always the
//! index of the currently selected entry in a freshly fetched list, plus
//! one, because indices are not stable across activations. Cancellation is
//! cooperative and takes effect at the next suspension boundary.

use super::cursor::{FolderPolicy, TraversalCursor};
use super::{CrawlConfig, CrawlOutcome, CrawlState, CrawlStatus, CrawlSummary};
use crate::capture::counter::DownloadCounterStore;
use crate::capture::path::{self, PathContext};
use crate::capture::{CaptureRequest, CaptureSink, ResourceDescriptor};
use crate::error::CrawlError;
use crate::events::{CrawlEvent, EventBus, SelectionLevel};
use crate::hierarchy::{
    ColorVariant, HierarchyScanner, Item, Layer, PaletteTarget, RenderObserver, SelectTarget,
    StateMutator,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct Stats {
    captures: u64,
    anomalies: u64,
    items_visited: u64,
}

/// The crawl driver. Holds the page capabilities, the capture pipeline, and
/// the session-scoped flags guarding re-entrancy and cancellation.
pub struct TraversalEngine {
    scanner: Arc<dyn HierarchyScanner>,
    mutator: Arc<dyn StateMutator>,
    observer: Arc<dyn RenderObserver>,
    sink: Arc<dyn CaptureSink>,
    events: Arc<EventBus>,
    config: CrawlConfig,
    crawl_id: String,
    counters: Mutex<DownloadCounterStore>,
    state: Mutex<CrawlState>,
    stats: Mutex<Stats>,
    last_resource: Mutex<Option<String>>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl TraversalEngine {
    pub fn new(
        scanner: Arc<dyn HierarchyScanner>,
        mutator: Arc<dyn StateMutator>,
        observer: Arc<dyn RenderObserver>,
        sink: Arc<dyn CaptureSink>,
        events: Arc<EventBus>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            scanner,
            mutator,
            observer,
            sink,
            events,
            config,
            crawl_id: format!("crawl-{}", Uuid::new_v4().simple()),
            counters: Mutex::new(DownloadCounterStore::new()),
            state: Mutex::new(CrawlState::Idle),
            stats: Mutex::new(Stats::default()),
            last_resource: Mutex::new(None),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Current state and counters.
    pub fn status(&self) -> CrawlStatus {
        let stats = self.stats.lock().unwrap().clone();
        CrawlStatus {
            state: *self.state.lock().unwrap(),
            captures: stats.captures,
            anomalies: stats.anomalies,
            items_visited: stats.items_visited,
        }
    }

    /// Request cooperative cancellation. Takes effect at the next
    /// suspension boundary; the current step completes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Run the crawl, optionally from an explicit starting item. Returns
    /// `AlreadyRunning` without touching the page if a crawl is active.
    pub async fn start(&self, start_item: Option<Item>) -> Result<CrawlOutcome, CrawlError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start() while a crawl is running — no-op");
            return Ok(CrawlOutcome::AlreadyRunning);
        }
        self.cancelled.store(false, Ordering::SeqCst);
        self.counters.lock().unwrap().reset(None);
        *self.stats.lock().unwrap() = Stats::default();
        *self.last_resource.lock().unwrap() = None;

        let started = Instant::now();
        let result = self.crawl(start_item, started).await;

        self.set_state(match &result {
            Ok(CrawlOutcome::Completed(_)) => CrawlState::Done,
            _ => CrawlState::Idle,
        });
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn crawl(
        &self,
        start_item: Option<Item>,
        started: Instant,
    ) -> Result<CrawlOutcome, CrawlError> {
        let items = self.scanner.list_items().await?;
        if items.is_empty() {
            self.events.emit(CrawlEvent::CrawlFailed {
                crawl_id: self.crawl_id.clone(),
                error: "no items detected".to_string(),
            });
            return Err(CrawlError::NoItems);
        }
        let item_count = items.len();

        let mut item = start_item
            .or_else(|| items.iter().find(|i| i.selected).cloned())
            .unwrap_or_else(|| items[0].clone());

        info!(
            "crawl starting: {} items, auto_advance={}",
            item_count, self.config.auto_advance
        );
        self.events.emit(CrawlEvent::CrawlStarted {
            crawl_id: self.crawl_id.clone(),
            maker_id: self.config.maker_id.clone(),
            auto_advance: self.config.auto_advance,
            item_count,
            timestamp: crate::events::now_timestamp(),
        });

        // The crawl cannot begin on an unselected item; this failure is not
        // downgraded to a skip like advancement failures are.
        if !item.selected {
            if !self
                .select_with_retry(&SelectTarget::Item(item.clone()), SelectionLevel::Item)
                .await?
            {
                let error = format!("initial selection of '{}' failed", item.display_name);
                self.events.emit(CrawlEvent::CrawlFailed {
                    crawl_id: self.crawl_id.clone(),
                    error,
                });
                return Err(CrawlError::InitialSelection(item.display_name.clone()));
            }
            self.settle(self.config.timings.item_settle).await;
        }

        loop {
            if self.is_cancelled() {
                return Ok(self.cancelled_outcome(started));
            }
            self.process_item(&item, item_count).await?;
            self.stats.lock().unwrap().items_visited += 1;
            if self.is_cancelled() {
                return Ok(self.cancelled_outcome(started));
            }

            if !self.config.auto_advance {
                break;
            }
            self.set_state(CrawlState::AdvancingItem);
            match self.advance_item(&item).await? {
                Some(next) => item = next,
                None => {
                    if self.is_cancelled() {
                        return Ok(self.cancelled_outcome(started));
                    }
                    break;
                }
            }
        }

        let summary = self.summary(started);
        info!(
            "crawl complete: {} captures, {} anomalies, {} items",
            summary.captures, summary.anomalies, summary.items_visited
        );
        self.events.emit(CrawlEvent::CrawlComplete {
            crawl_id: self.crawl_id.clone(),
            captures: summary.captures,
            anomalies: summary.anomalies,
            items_visited: summary.items_visited,
            elapsed_ms: summary.elapsed_ms,
        });
        Ok(CrawlOutcome::Completed(summary))
    }

    /// One full item activation: layer scanning, palette classification,
    /// color iteration, layer advancement, until the item is exhausted.
    async fn process_item(&self, item: &Item, item_total: usize) -> Result<(), CrawlError> {
        self.events.emit(CrawlEvent::ItemStarted {
            crawl_id: self.crawl_id.clone(),
            item: item.display_name.clone(),
            ordinal: item.ordinal,
            total: item_total,
        });

        // Fresh item start: restart the item folder's numbering so
        // re-entering an item begins at 1 again.
        let item_folder = self.destination(item, None, None, FolderPolicy::ItemSingle);
        self.counters.lock().unwrap().reset(Some(&item_folder));

        loop {
            if self.is_cancelled() {
                return Ok(());
            }
            self.set_state(CrawlState::ScanningLayers);
            let layers = self.scanner.list_layers(item).await?;
            let layer_count = layers.len();

            if layer_count <= 1 {
                // Singleton layer: any palette belongs to the item itself.
                let target = PaletteTarget::Item(item.clone());
                let colors = self.scanner.list_colors(&target).await?;
                let layer = layers.into_iter().next();
                if colors.is_empty() {
                    let cursor = TraversalCursor {
                        item: item.clone(),
                        layer,
                        color: None,
                        has_color_palette: false,
                        layer_count: 1,
                    };
                    self.capture_unit(&cursor).await?;
                } else {
                    self.iterate_colors(item, layer.as_ref(), 1).await?;
                }
                return Ok(());
            }

            // Multi-layer: establish the active layer, entering at the
            // first reachable one when nothing is selected yet.
            let active = match layers.iter().find(|l| l.selected) {
                Some(l) => l.clone(),
                None => {
                    if self.advance_layer_from(&layers, 0).await? {
                        continue;
                    }
                    return Ok(());
                }
            };
            self.events.emit(CrawlEvent::LayerStarted {
                crawl_id: self.crawl_id.clone(),
                layer: active.display_name.clone(),
                ordinal: active.ordinal,
                total: layer_count,
            });

            let colors = self
                .scanner
                .list_colors(&PaletteTarget::Layer(active.clone()))
                .await?;
            if colors.is_empty() {
                let cursor = TraversalCursor {
                    item: item.clone(),
                    layer: Some(active.clone()),
                    color: None,
                    has_color_palette: false,
                    layer_count,
                };
                self.capture_unit(&cursor).await?;
            } else {
                self.iterate_colors(item, Some(&active), layer_count).await?;
            }

            if self.is_cancelled() {
                return Ok(());
            }

            // Advance over a freshly re-queried list: the container may
            // have been re-created since the activation began.
            self.set_state(CrawlState::AdvancingLayer);
            let fresh = self.scanner.list_layers(item).await?;
            let current = fresh
                .iter()
                .position(|l| l.selected)
                .or_else(|| fresh.iter().position(|l| l.id == active.id));
            let from = current.map(|i| i + 1).unwrap_or(fresh.len());
            if !self.advance_layer_from(&fresh, from).await? {
                return Ok(());
            }
        }
    }

    /// Select the first reachable layer at or after `from`, skipping
    /// unreachable siblings with an anomaly each. Returns false when the
    /// item has no further reachable layer.
    async fn advance_layer_from(&self, layers: &[Layer], from: usize) -> Result<bool, CrawlError> {
        for cand in layers.iter().skip(from) {
            if self.is_cancelled() {
                return Ok(false);
            }
            if self
                .select_with_retry(&SelectTarget::Layer(cand.clone()), SelectionLevel::Layer)
                .await?
            {
                self.settle(self.config.timings.layer_settle).await;
                return Ok(true);
            }
            self.anomaly(format!(
                "layer '{}' unreachable after retry, skipping",
                cand.display_name
            ));
        }
        Ok(false)
    }

    /// Select the first reachable item after the currently selected one.
    async fn advance_item(&self, current: &Item) -> Result<Option<Item>, CrawlError> {
        let fresh = self.scanner.list_items().await?;
        let position = fresh
            .iter()
            .position(|i| i.selected)
            .or_else(|| fresh.iter().position(|i| i.id == current.id));
        let from = position.map(|i| i + 1).unwrap_or(fresh.len());
        for cand in fresh.iter().skip(from) {
            if self.is_cancelled() {
                return Ok(None);
            }
            if self
                .select_with_retry(&SelectTarget::Item(cand.clone()), SelectionLevel::Item)
                .await?
            {
                self.settle(self.config.timings.item_settle).await;
                return Ok(Some(cand.clone()));
            }
            self.anomaly(format!(
                "item '{}' unreachable after retry, skipping",
                cand.display_name
            ));
        }
        Ok(None)
    }

    /// One layer activation's color loop. The processed set lives only for
    /// this activation: a hex is handled at most once per activation, and
    /// duplicate palette entries collapse onto their first occurrence.
    async fn iterate_colors(
        &self,
        item: &Item,
        layer: Option<&Layer>,
        layer_count: usize,
    ) -> Result<(), CrawlError> {
        self.set_state(CrawlState::IteratingColors);
        let target = match layer {
            Some(l) if layer_count > 1 => PaletteTarget::Layer(l.clone()),
            _ => PaletteTarget::Item(item.clone()),
        };
        let mut processed: HashSet<String> = HashSet::new();

        loop {
            if self.is_cancelled() {
                return Ok(());
            }
            // Fresh snapshot each step — entries are not stable across
            // renders, so the next target is re-derived every time.
            let colors = self.scanner.list_colors(&target).await?;
            let Some(next) = colors.iter().find(|c| !processed.contains(&c.hex)).cloned() else {
                return Ok(());
            };
            let palette_size = colors.len();
            processed.insert(next.hex.clone());

            if !self
                .select_with_retry(&SelectTarget::Color(next.clone()), SelectionLevel::Color)
                .await?
            {
                self.anomaly(format!(
                    "color {} had no visible effect, skipping",
                    next.hex
                ));
                continue;
            }
            debug!(
                "color {}/{} applied: {}",
                next.ordinal + 1,
                palette_size,
                next.hex
            );
            self.settle(self.config.timings.color_settle).await;
            if self.is_cancelled() {
                return Ok(());
            }

            let cursor = TraversalCursor {
                item: item.clone(),
                layer: layer.cloned(),
                color: Some(next),
                has_color_palette: true,
                layer_count,
            };
            self.capture_unit(&cursor).await?;
            self.settle(self.config.timings.step_pace).await;
        }
    }

    /// Wait for an emitted render, then address and hand it to the sink.
    /// A unit with no observable render is an anomaly, not a failure.
    async fn capture_unit(&self, cursor: &TraversalCursor) -> Result<(), CrawlError> {
        let Some(resource) = self.await_render().await? else {
            self.anomaly(format!(
                "no rendered resource observed for {}",
                cursor.describe()
            ));
            return Ok(());
        };

        let policy = cursor.policy();
        let destination = self.destination(
            &cursor.item,
            cursor.layer.as_ref(),
            cursor.color.as_ref(),
            policy,
        );
        let sequence = self.counters.lock().unwrap().next_sequence(&destination);
        *self.last_resource.lock().unwrap() = Some(resource.url.clone());

        self.events.emit(CrawlEvent::Captured {
            crawl_id: self.crawl_id.clone(),
            destination: destination.clone(),
            sequence,
            resource_url: resource.url.clone(),
        });
        self.sink.persist(CaptureRequest {
            destination,
            sequence,
            resource,
        });
        self.stats.lock().unwrap().captures += 1;
        Ok(())
    }

    /// Bounded poll for a render differing from the previous capture. The
    /// page may legitimately re-emit the same URL, so after the bound
    /// elapses whatever was last seen is still captured.
    async fn await_render(&self) -> Result<Option<ResourceDescriptor>, CrawlError> {
        let last = self.last_resource.lock().unwrap().clone();
        let mut seen: Option<ResourceDescriptor> = None;
        let attempts = self.config.timings.observe_attempts.max(1);
        for attempt in 0..attempts {
            if let Some(resource) = self.observer.latest_render().await? {
                if last.as_deref() != Some(resource.url.as_str()) {
                    return Ok(Some(resource));
                }
                seen = Some(resource);
            }
            if attempt + 1 < attempts {
                self.settle(self.config.timings.observe_poll).await;
            }
        }
        Ok(seen)
    }

    /// Resolve the destination folder for a unit of work. Without a maker
    /// id there is no hierarchy to encode and the manual folder applies.
    fn destination(
        &self,
        item: &Item,
        layer: Option<&Layer>,
        color: Option<&ColorVariant>,
        policy: FolderPolicy,
    ) -> String {
        let Some(maker_id) = self.config.maker_id.as_deref() else {
            return self.config.fallback_folder.clone();
        };
        let color_subfolder = policy.color_subfolder();
        let ctx = PathContext {
            maker_id,
            item_name: Some(item.display_name.as_str()),
            color_hex: if color_subfolder {
                color.map(|c| c.hex.as_str())
            } else {
                None
            },
            layer_name: if color_subfolder {
                layer.map(|l| l.display_name.as_str())
            } else {
                None
            },
            has_color_palette: color_subfolder,
        };
        path::resolve(&ctx)
    }

    /// Apply a selection with one engine-level retry on top of the
    /// mutator's internal ladder. Mutator errors count as "no visible
    /// effect" — the page owes us a boolean, not an exception.
    async fn select_with_retry(
        &self,
        target: &SelectTarget,
        level: SelectionLevel,
    ) -> Result<bool, CrawlError> {
        for attempt in 0..2 {
            let applied = match self.mutator.select(target).await {
                Ok(applied) => applied,
                Err(e) => {
                    warn!("select '{}' errored: {e:#}", target.label());
                    false
                }
            };
            if applied {
                self.events.emit(CrawlEvent::SelectionChanged {
                    crawl_id: self.crawl_id.clone(),
                    target: target.label().to_string(),
                    level,
                });
                return Ok(true);
            }
            if attempt == 0 {
                debug!("retrying selection of '{}'", target.label());
            }
        }
        Ok(false)
    }

    fn anomaly(&self, detail: String) {
        warn!("{detail}");
        self.stats.lock().unwrap().anomalies += 1;
        self.events.emit(CrawlEvent::Anomaly {
            crawl_id: self.crawl_id.clone(),
            detail,
        });
    }

    async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        } else {
            // Still a suspension boundary for cancellation purposes.
            tokio::task::yield_now().await;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancelled_outcome(&self, started: Instant) -> CrawlOutcome {
        let summary = self.summary(started);
        info!(
            "crawl cancelled: {} captures, {} anomalies",
            summary.captures, summary.anomalies
        );
        self.events.emit(CrawlEvent::CrawlCancelled {
            crawl_id: self.crawl_id.clone(),
            captures: summary.captures,
            anomalies: summary.anomalies,
        });
        CrawlOutcome::Cancelled(summary)
    }

    fn summary(&self, started: Instant) -> CrawlSummary {
        let stats = self.stats.lock().unwrap().clone();
        CrawlSummary {
            captures: stats.captures,
            anomalies: stats.anomalies,
            items_visited: stats.items_visited,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn set_state(&self, state: CrawlState) {
        *self.state.lock().unwrap() = state;
    }
}
