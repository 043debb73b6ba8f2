//! Crawl error taxonomy.
//!
//! Only structural failures at crawl start surface as errors; everything
//! else (selection misfires, missing palettes, stale renders) is reported
//! as an anomaly event and the traversal continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// No items were detected on the page at crawl start. Fatal: there is
    /// nothing to traverse.
    #[error("no items detected on the page — select a maker page and wait for it to load")]
    NoItems,

    /// The initial item selection (entering the crawl) failed verification.
    /// Advancement selections degrade to skip-with-anomaly; this one cannot.
    #[error("initial selection of item '{0}' had no visible effect")]
    InitialSelection(String),

    /// The page itself stopped responding to evaluation.
    #[error("page evaluation failed")]
    Page(#[from] anyhow::Error),
}
