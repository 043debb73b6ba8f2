//! The traversal cursor and the folder-policy classification of an
//! activation.
//!
//! The cursor is rebuilt defensively around every unit of work — it is
//! never trusted across a suspension gap, because the page may have
//! re-created any container in the meantime.

use crate::hierarchy::{ColorVariant, Item, Layer};
use serde::Serialize;

/// Where the traversal currently stands. Created at crawl start, mutated
/// after each successful unit, discarded on completion, cancellation, or
/// fatal failure.
#[derive(Debug, Clone)]
pub struct TraversalCursor {
    pub item: Item,
    pub layer: Option<Layer>,
    pub color: Option<ColorVariant>,
    /// Whether the current activation exposed a palette.
    pub has_color_palette: bool,
    /// Layer count of the current item; an item with no locatable layer
    /// container counts as 1.
    pub layer_count: usize,
}

impl TraversalCursor {
    pub fn policy(&self) -> FolderPolicy {
        FolderPolicy::classify(self.layer_count, self.has_color_palette)
    }

    /// Label for logs and anomaly reports.
    pub fn describe(&self) -> String {
        let mut s = self.item.display_name.clone();
        if let Some(layer) = &self.layer {
            s.push('/');
            s.push_str(&layer.display_name);
        }
        if let Some(color) = &self.color {
            s.push('/');
            s.push_str(&color.hex);
        }
        s
    }
}

/// The four folder policies of an activation. Classification happens once
/// per activation, from freshly scanned counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FolderPolicy {
    /// Singleton layer with a palette: the item itself has the palette.
    /// Colors iterate directly into the item folder — no color subfolder.
    ItemPalette,
    /// Singleton layer, no palette: exactly one capture into the item
    /// folder, no loop.
    ItemSingle,
    /// Multi-layer, active layer has a palette: colors iterate into
    /// per-color subfolders.
    LayerPalette,
    /// Multi-layer, active layer has no palette: one capture into the item
    /// folder, then advance to the next layer.
    LayerSingle,
}

impl FolderPolicy {
    pub fn classify(layer_count: usize, has_palette: bool) -> Self {
        match (layer_count > 1, has_palette) {
            (false, true) => Self::ItemPalette,
            (false, false) => Self::ItemSingle,
            (true, true) => Self::LayerPalette,
            (true, false) => Self::LayerSingle,
        }
    }

    /// Whether captures under this policy get a per-color subfolder.
    pub fn color_subfolder(&self) -> bool {
        matches!(self, Self::LayerPalette)
    }

    /// Whether this policy loops over palette entries at all.
    pub fn iterates_colors(&self) -> bool {
        matches!(self, Self::ItemPalette | Self::LayerPalette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_covers_all_four() {
        assert_eq!(FolderPolicy::classify(1, true), FolderPolicy::ItemPalette);
        assert_eq!(FolderPolicy::classify(1, false), FolderPolicy::ItemSingle);
        assert_eq!(FolderPolicy::classify(3, true), FolderPolicy::LayerPalette);
        assert_eq!(FolderPolicy::classify(2, false), FolderPolicy::LayerSingle);
    }

    #[test]
    fn test_missing_layer_container_counts_as_singleton() {
        // layer_count 0 behaves as 1: the item is its own layer
        assert_eq!(FolderPolicy::classify(0, true), FolderPolicy::ItemPalette);
        assert_eq!(FolderPolicy::classify(0, false), FolderPolicy::ItemSingle);
    }

    #[test]
    fn test_only_multi_layer_palettes_get_color_subfolders() {
        assert!(FolderPolicy::LayerPalette.color_subfolder());
        assert!(!FolderPolicy::ItemPalette.color_subfolder());
        assert!(!FolderPolicy::ItemSingle.color_subfolder());
        assert!(!FolderPolicy::LayerSingle.color_subfolder());
    }

    #[test]
    fn test_iteration_follows_palette_presence() {
        assert!(FolderPolicy::ItemPalette.iterates_colors());
        assert!(FolderPolicy::LayerPalette.iterates_colors());
        assert!(!FolderPolicy::ItemSingle.iterates_colors());
        assert!(!FolderPolicy::LayerSingle.iterates_colors());
    }
}
