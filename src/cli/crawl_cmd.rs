//! Run a crawl end to end against a live maker page.

use crate::capture::download::FsCaptureSink;
use crate::engine::{CrawlConfig, CrawlOutcome, CrawlSummary, SettleTimings, TraversalEngine};
use crate::events::{CrawlEvent, EventBus};
use crate::hierarchy::dom::{DomMutator, DomObserver, DomScanner, PageHandle};
use crate::hierarchy::HierarchyScanner;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

/// Navigation timeout for the initial page load.
const PAGE_LOAD_TIMEOUT_MS: u64 = 30_000;

/// Scans to wait for the item hierarchy to hydrate, one second apart.
const HYDRATION_ATTEMPTS: u32 = 5;

/// Inputs from the command line.
#[derive(Debug, Clone)]
pub struct CrawlArgs {
    pub url: String,
    /// Auto-advance across items until the page is exhausted.
    pub all: bool,
    /// Capture root directory.
    pub out: PathBuf,
    /// Manual fallback folder when no maker hierarchy is detected.
    pub folder: String,
    /// Override for the post-color settle delay.
    pub settle_ms: Option<u64>,
    /// Show the browser window.
    pub headful: bool,
}

pub async fn run(args: CrawlArgs) -> Result<()> {
    let renderer = ChromiumRenderer::launch(args.headful).await?;
    let mut context = renderer.new_context().await?;
    let nav = context.navigate(&args.url, PAGE_LOAD_TIMEOUT_MS).await?;
    info!("loaded {} in {}ms", nav.final_url, nav.load_time_ms);

    let maker_id = extract_maker_id(&nav.final_url);
    match &maker_id {
        Some(id) => info!("maker id: {id}"),
        None => warn!(
            "no maker id in URL — captures will go to '{}'",
            args.folder
        ),
    }

    let page = PageHandle::new(context);
    let scanner = Arc::new(DomScanner::new(page.clone()));

    // The page hydrates asynchronously; give the hierarchy a few seconds
    // to appear before the engine treats its absence as fatal.
    for _ in 0..HYDRATION_ATTEMPTS {
        if !scanner.list_items().await?.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    let events = Arc::new(EventBus::default());
    let mut timings = SettleTimings::default();
    if let Some(ms) = args.settle_ms {
        timings.color_settle = Duration::from_millis(ms);
    }
    let engine = Arc::new(TraversalEngine::new(
        scanner,
        Arc::new(DomMutator::new(page.clone())),
        Arc::new(DomObserver::new(page)),
        Arc::new(FsCaptureSink::new(&args.out)),
        events.clone(),
        CrawlConfig {
            maker_id,
            auto_advance: args.all,
            fallback_folder: args.folder,
            timings,
        },
    ));

    spawn_progress_printer(&events);

    // Ctrl-C requests cooperative cancellation; the summary still prints.
    {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ncancelling after the current step...");
                engine.cancel();
            }
        });
    }

    let result = engine.start(None).await;
    renderer.shutdown().await?;

    match result {
        Ok(CrawlOutcome::Completed(summary)) => {
            print_summary("Crawl complete", &summary, &args.out);
            Ok(())
        }
        Ok(CrawlOutcome::Cancelled(summary)) => {
            print_summary("Crawl cancelled", &summary, &args.out);
            Ok(())
        }
        Ok(CrawlOutcome::AlreadyRunning) => {
            eprintln!("A crawl is already running on this engine.");
            Ok(())
        }
        Err(e) => {
            eprintln!("Crawl aborted: {e}");
            Err(e.into())
        }
    }
}

fn spawn_progress_printer(events: &Arc<EventBus>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                CrawlEvent::ItemStarted {
                    item,
                    ordinal,
                    total,
                    ..
                } => println!("item {}/{}: {}", ordinal + 1, total, item),
                CrawlEvent::LayerStarted {
                    layer,
                    ordinal,
                    total,
                    ..
                } => println!("  layer {}/{}: {}", ordinal + 1, total, layer),
                CrawlEvent::Captured {
                    destination,
                    sequence,
                    ..
                } => println!("    captured {destination}/{sequence}"),
                CrawlEvent::Anomaly { detail, .. } => println!("    anomaly: {detail}"),
                _ => {}
            }
        }
    });
}

fn print_summary(heading: &str, summary: &CrawlSummary, out: &std::path::Path) {
    println!();
    println!(
        "{heading}: {} captures across {} items, {} anomalies, {:.1}s",
        summary.captures,
        summary.items_visited,
        summary.anomalies,
        summary.elapsed_ms as f64 / 1000.0
    );
    println!("Output root: {}", out.display());
}

/// Extract the maker id from a generator page URL (`/image_maker/<digits>`).
pub fn extract_maker_id(url: &str) -> Option<String> {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| regex::Regex::new(r"/image_maker/(\d+)").unwrap());
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    re.captures(&path).map(|c| c[1].to_string())
}
