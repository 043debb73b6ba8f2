//! Capture contracts: what the engine emits per unit of work, and the sink
//! that persists it.

pub mod counter;
pub mod download;
pub mod path;

use serde::{Deserialize, Serialize};

/// A resource the page emitted for the current combination. Either an
/// `http(s)` URL or a `data:` URL exported from the preview canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub url: String,
}

impl ResourceDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// One unit of work, fully addressed: where it goes, which number it gets,
/// and what to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRequest {
    /// Resolved destination folder, relative to the sink's root.
    pub destination: String,
    /// Sequence number within the destination, assigned in enumeration order.
    pub sequence: u32,
    /// The emitted resource to persist.
    pub resource: ResourceDescriptor,
}

/// Persists captured resources. Fire-and-forget: `persist` must return
/// without blocking on the write — the engine never waits on persistence,
/// only on render settle. Path collisions are the sink's problem (uniquify),
/// invisible to the engine. Write failures are logged, never propagated.
pub trait CaptureSink: Send + Sync {
    fn persist(&self, request: CaptureRequest);
}
