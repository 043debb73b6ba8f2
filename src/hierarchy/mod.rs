//! The three-level page hierarchy (Item → Layer → Color) and the abstract
//! page capabilities the engine consumes.
//!
//! Everything here is a snapshot of volatile on-screen state: lists are
//! re-derived from the live page on every call and invalidate on any
//! mutation. Absence is an empty list, never an error.

pub mod dom;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A top-level selectable visual component. At most one is selected at any
/// instant; the set is re-discovered fresh on every scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Opaque identity attribute from the page (`data-key`).
    pub id: String,
    /// Human-readable name, derived from page attributes. Opaque: unique
    /// within a single scan at best, carries no semantic meaning.
    pub display_name: String,
    /// Position in the scanned list.
    pub ordinal: usize,
    /// Whether the page currently marks this entry selected.
    pub selected: bool,
}

/// A sub-component of the active Item, independently colorable. The full
/// set is revalidated on every Item change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub display_name: String,
    pub ordinal: usize,
    /// The item this layer was scanned under.
    pub parent_item_id: String,
    pub selected: bool,
}

/// A selectable palette entry. Belongs to the active Layer (or the Item
/// itself for singleton-layer items); may be entirely absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorVariant {
    /// Six-digit uppercase hex, derived from the entry's rgb background.
    pub hex: String,
    pub ordinal: usize,
    /// Opaque identity attribute from the page.
    pub data_key: String,
    pub selected: bool,
}

/// What the palette belongs to when listing colors: the active layer, or
/// the item itself when the item has a single (implicit) layer.
#[derive(Debug, Clone)]
pub enum PaletteTarget {
    Item(Item),
    Layer(Layer),
}

/// A selection the mutator can apply.
#[derive(Debug, Clone)]
pub enum SelectTarget {
    Item(Item),
    Layer(Layer),
    Color(ColorVariant),
}

impl SelectTarget {
    /// The page-side identity attribute to locate the entry by.
    pub fn data_key(&self) -> &str {
        match self {
            Self::Item(i) => &i.id,
            Self::Layer(l) => &l.id,
            Self::Color(c) => &c.data_key,
        }
    }

    /// Human-readable label for logs and anomaly reports.
    pub fn label(&self) -> &str {
        match self {
            Self::Item(i) => &i.display_name,
            Self::Layer(l) => &l.display_name,
            Self::Color(c) => &c.hex,
        }
    }
}

/// What the page currently has selected at each level.
#[derive(Debug, Clone, Default)]
pub struct SelectionSnapshot {
    pub item: Option<Item>,
    pub layer: Option<Layer>,
    pub color: Option<ColorVariant>,
}

/// Read-only snapshot queries over the live page hierarchy.
///
/// Implementations must not cache: every call re-derives from live state,
/// since any mutation invalidates prior results. Empty lists are legitimate
/// terminal cases, not errors.
#[async_trait]
pub trait HierarchyScanner: Send + Sync {
    /// All items in on-screen order, with selection flags.
    async fn list_items(&self) -> Result<Vec<Item>>;

    /// Layers of the given item, in on-screen order. Empty when the layer
    /// container is not locatable (the item behaves as a singleton layer).
    async fn list_layers(&self, item: &Item) -> Result<Vec<Layer>>;

    /// Palette entries of the target, in on-screen order. Empty when no
    /// palette exists.
    async fn list_colors(&self, target: &PaletteTarget) -> Result<Vec<ColorVariant>>;

    /// What is currently selected at each level.
    async fn current_selection(&self) -> Result<SelectionSnapshot>;
}

/// Applies a selection to the page and verifies it took effect.
///
/// `select` returns `Ok(true)` only after the page reports the entry as
/// selected. "No visible effect" is `Ok(false)`, never an error — the
/// implementation exhausts its internal retry ladder first. A successful
/// selection triggers an async re-render; callers must allow a bounded
/// settle delay before trusting subsequent scans.
#[async_trait]
pub trait StateMutator: Send + Sync {
    async fn select(&self, target: &SelectTarget) -> Result<bool>;
}

/// Reports the most recently emitted preview resource, if any.
///
/// The engine polls this after each selection settles to pick up the render
/// the page emitted for the new combination.
#[async_trait]
pub trait RenderObserver: Send + Sync {
    async fn latest_render(&self) -> Result<Option<crate::capture::ResourceDescriptor>>;
}

/// Convert an inline `rgb(r, g, b)` style value to six-digit uppercase hex.
/// Returns `None` for anything that is not a plain rgb() triple.
pub fn rgb_to_hex(rgb: &str) -> Option<String> {
    let caps = rgb_pattern().captures(rgb)?;
    let r: u32 = caps[1].parse().ok()?;
    let g: u32 = caps[2].parse().ok()?;
    let b: u32 = caps[3].parse().ok()?;
    if r > 255 || g > 255 || b > 255 {
        return None;
    }
    Some(format!("{:06X}", (r << 16) | (g << 8) | b))
}

fn rgb_pattern() -> &'static regex::Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"rgb\((\d+),\s*(\d+),\s*(\d+)\)").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_hex_basic() {
        assert_eq!(rgb_to_hex("rgb(255, 0, 0)").as_deref(), Some("FF0000"));
        assert_eq!(rgb_to_hex("rgb(0, 0, 0)").as_deref(), Some("000000"));
        assert_eq!(rgb_to_hex("rgb(18, 52, 86)").as_deref(), Some("123456"));
    }

    #[test]
    fn test_rgb_to_hex_no_spaces() {
        assert_eq!(rgb_to_hex("rgb(1,2,3)").as_deref(), Some("010203"));
    }

    #[test]
    fn test_rgb_to_hex_rejects_non_rgb() {
        assert_eq!(rgb_to_hex("linear-gradient(red, blue)"), None);
        assert_eq!(rgb_to_hex("#ff0000"), None);
        assert_eq!(rgb_to_hex(""), None);
    }

    #[test]
    fn test_rgb_to_hex_rejects_out_of_range() {
        assert_eq!(rgb_to_hex("rgb(300, 0, 0)"), None);
    }

    #[test]
    fn test_select_target_accessors() {
        let color = ColorVariant {
            hex: "AABBCC".to_string(),
            ordinal: 2,
            data_key: "c-7".to_string(),
            selected: false,
        };
        let target = SelectTarget::Color(color);
        assert_eq!(target.data_key(), "c-7");
        assert_eq!(target.label(), "AABBCC");
    }
}
