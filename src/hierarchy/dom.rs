//! DOM-backed implementations of the page capabilities.
//!
//! All three capabilities evaluate JavaScript through a shared
//! [`PageHandle`]. The selectors encode one site's conventions: palette
//! entries are `li[data-key]` with an inline rgb background inside the
//! color box, items live in item/category containers, and layers are the
//! non-color entries of the carousel slide owning the selected item. Every
//! interpolated value is escaped before it reaches a JS string literal.

use super::{
    ColorVariant, HierarchyScanner, Item, Layer, PaletteTarget, RenderObserver,
    SelectTarget, SelectionSnapshot, StateMutator, rgb_to_hex,
};
use crate::capture::download::is_capturable_url;
use crate::capture::ResourceDescriptor;
use crate::renderer::RenderContext;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared handle to the live page. The crawl is single-threaded, so the
/// mutex only serializes the scanner/mutator/observer against each other.
#[derive(Clone)]
pub struct PageHandle {
    context: Arc<Mutex<Box<dyn RenderContext>>>,
}

impl PageHandle {
    pub fn new(context: Box<dyn RenderContext>) -> Self {
        Self {
            context: Arc::new(Mutex::new(context)),
        }
    }

    pub async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        self.context.lock().await.execute_js(script).await
    }
}

/// Raw palette/layer/item entry as the page reports it.
#[derive(Debug, Deserialize)]
struct RawEntry {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    background: Option<String>,
    selected: bool,
}

/// Scanner over the live DOM. Stateless: every call re-queries the page.
#[derive(Clone)]
pub struct DomScanner {
    page: PageHandle,
}

impl DomScanner {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }

    async fn raw_entries(&self, script: &str) -> Result<Vec<RawEntry>> {
        let value = self.page.eval(script).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

#[async_trait]
impl HierarchyScanner for DomScanner {
    async fn list_items(&self) -> Result<Vec<Item>> {
        let raw = self.raw_entries(LIST_ITEMS_JS).await?;
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(ordinal, e)| Item {
                display_name: e.name.unwrap_or_else(|| format!("Item_{}", ordinal + 1)),
                id: e.key,
                ordinal,
                selected: e.selected,
            })
            .collect())
    }

    async fn list_layers(&self, item: &Item) -> Result<Vec<Layer>> {
        let script = LIST_LAYERS_JS.replace("__KEY__", &js_escape(&item.id));
        let raw = self.raw_entries(&script).await?;
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(ordinal, e)| Layer {
                display_name: e.name.clone().unwrap_or_else(|| e.key.clone()),
                id: e.key,
                ordinal,
                parent_item_id: item.id.clone(),
                selected: e.selected,
            })
            .collect())
    }

    async fn list_colors(&self, _target: &PaletteTarget) -> Result<Vec<ColorVariant>> {
        // The palette box is a single on-screen surface: it always shows the
        // palette of whatever is currently active, so the target does not
        // change the query — only what the caller does with the result.
        let raw = self.raw_entries(LIST_COLORS_JS).await?;
        let mut colors = Vec::new();
        for e in raw {
            let Some(hex) = e.background.as_deref().and_then(rgb_to_hex) else {
                continue;
            };
            colors.push(ColorVariant {
                hex,
                ordinal: colors.len(),
                data_key: e.key,
                selected: e.selected,
            });
        }
        Ok(colors)
    }

    async fn current_selection(&self) -> Result<SelectionSnapshot> {
        let items = self.list_items().await?;
        let item = items.into_iter().find(|i| i.selected);
        let Some(item) = item else {
            return Ok(SelectionSnapshot::default());
        };
        let layers = self.list_layers(&item).await?;
        let layer = layers.into_iter().find(|l| l.selected);
        let target = match layer.clone() {
            Some(l) => PaletteTarget::Layer(l),
            None => PaletteTarget::Item(item.clone()),
        };
        let color = self
            .list_colors(&target)
            .await?
            .into_iter()
            .find(|c| c.selected);
        Ok(SelectionSnapshot {
            item: Some(item),
            layer,
            color,
        })
    }
}

/// Mutator over the live DOM: a click retry ladder with verification after
/// each rung. Only success/failure is exposed upward.
#[derive(Clone)]
pub struct DomMutator {
    page: PageHandle,
    /// Wait between a click rung and its verification scan.
    verify_delay: Duration,
}

impl DomMutator {
    pub fn new(page: PageHandle) -> Self {
        Self {
            page,
            verify_delay: Duration::from_millis(300),
        }
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    async fn run_rung(&self, script: &str) -> Result<bool> {
        let value = self.page.eval(script).await?;
        Ok(value
            .as_object()
            .and_then(|o| o.get("clicked"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn verify_selected(&self, key: &str) -> Result<bool> {
        let script = VERIFY_SELECTED_JS.replace("__KEY__", &js_escape(key));
        let value = self.page.eval(&script).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl StateMutator for DomMutator {
    async fn select(&self, target: &SelectTarget) -> Result<bool> {
        let key = js_escape(target.data_key());
        let rungs = [
            CLICK_DIRECT_JS.replace("__KEY__", &key),
            CLICK_EVENTS_JS.replace("__KEY__", &key),
            CLICK_CHILD_JS.replace("__KEY__", &key),
        ];

        for (rung, script) in rungs.iter().enumerate() {
            if !self.run_rung(script).await? {
                // Entry not locatable right now; later rungs use the same
                // lookup, so stop here.
                debug!("select '{}': entry not found (rung {rung})", target.label());
                return Ok(false);
            }
            tokio::time::sleep(self.verify_delay).await;
            if self.verify_selected(target.data_key()).await? {
                return Ok(true);
            }
            debug!(
                "select '{}': rung {rung} clicked but did not verify",
                target.label()
            );
        }
        Ok(false)
    }
}

/// Observer over the live DOM: reports the largest capturable rendered
/// image, falling back to exporting the preview canvas.
#[derive(Clone)]
pub struct DomObserver {
    page: PageHandle,
}

impl DomObserver {
    pub fn new(page: PageHandle) -> Self {
        Self { page }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawRender {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    canvas: Option<String>,
}

#[async_trait]
impl RenderObserver for DomObserver {
    async fn latest_render(&self) -> Result<Option<ResourceDescriptor>> {
        let value = self.page.eval(OBSERVE_RENDER_JS).await?;
        if value.is_null() {
            return Ok(None);
        }
        let raw: RawRender = serde_json::from_value(value).unwrap_or_default();
        if let Some(url) = raw.images.into_iter().find(|u| is_capturable_url(u)) {
            return Ok(Some(ResourceDescriptor::new(url)));
        }
        Ok(raw.canvas.map(ResourceDescriptor::new))
    }
}

/// Escape a string for safe injection into a JS string literal.
fn js_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

// ── JS snippets ───────────────────────────────────────────────────────────
//
// Entries are identified by their `data-key` attribute. A color entry is a
// `li[data-key]` with an inline rgb background, or anything inside the
// palette box; items and layers must not be color entries.

const LIST_ITEMS_JS: &str = r#"(() => {
    const out = [];
    document.querySelectorAll('li[data-key]').forEach((li) => {
        if (li.closest('.imagemaker_colorBox')) return;
        if (li.style.background && li.style.background.includes('rgb')) return;
        const container = li.closest('.imagemaker_itemBox')
            || li.closest('[class*="item"]')
            || li.closest('[class*="category"]');
        if (!container) return;
        out.push({
            key: li.getAttribute('data-key'),
            name: li.title
                || li.getAttribute('aria-label')
                || li.getAttribute('data-name')
                || null,
            selected: li.classList.contains('selected'),
        });
    });
    return out;
})()"#;

const LIST_LAYERS_JS: &str = r#"(() => {
    const anchor = document.querySelector('li[data-key="__KEY__"]');
    const scope = (anchor && anchor.closest('.splide__slide'))
        || document.querySelector('.splide__slide.is-active, .splide__slide.is-visible');
    if (!scope) return [];
    const out = [];
    scope.querySelectorAll('li[data-key]').forEach((li) => {
        if (li.classList.contains('remove_item')) return;
        if (li.closest('.imagemaker_colorBox')) return;
        if (li.style.background && li.style.background.includes('rgb')) return;
        const img = li.querySelector('img');
        out.push({
            key: li.getAttribute('data-key'),
            name: li.title
                || li.getAttribute('aria-label')
                || (img && img.alt)
                || null,
            selected: li.classList.contains('selected'),
        });
    });
    return out;
})()"#;

const LIST_COLORS_JS: &str = r#"(() => {
    const collect = (root) => {
        const out = [];
        root.querySelectorAll('li[data-key]').forEach((li) => {
            const bg = li.style.background;
            if (!bg || !bg.includes('rgb')) return;
            out.push({
                key: li.getAttribute('data-key'),
                background: bg,
                selected: li.classList.contains('selected'),
            });
        });
        return out;
    };
    const box = document.querySelector('.imagemaker_colorBox .simplebar-content ul');
    if (box) {
        const entries = collect(box);
        if (entries.length > 0) return entries;
    }
    for (const ul of document.querySelectorAll('ul')) {
        const entries = collect(ul);
        if (entries.length >= 2) return entries;
    }
    return [];
})()"#;

const VERIFY_SELECTED_JS: &str = r#"(() => {
    const el = document.querySelector('li[data-key="__KEY__"]');
    return !!(el && el.classList.contains('selected'));
})()"#;

const CLICK_DIRECT_JS: &str = r#"(() => {
    const el = document.querySelector('li[data-key="__KEY__"]');
    if (!el) return { clicked: false };
    el.click();
    return { clicked: true };
})()"#;

const CLICK_EVENTS_JS: &str = r#"(() => {
    const el = document.querySelector('li[data-key="__KEY__"]');
    if (!el) return { clicked: false };
    for (const type of ['mousedown', 'mouseup', 'click']) {
        el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: window }));
    }
    return { clicked: true };
})()"#;

const CLICK_CHILD_JS: &str = r#"(() => {
    const el = document.querySelector('li[data-key="__KEY__"]');
    if (!el) return { clicked: false };
    const child = el.querySelector('div, img, button, a');
    if (!child) return { clicked: false };
    child.click();
    return { clicked: true };
})()"#;

const OBSERVE_RENDER_JS: &str = r#"(() => {
    const images = [...document.querySelectorAll('img')]
        .map((img) => ({
            src: img.currentSrc || img.src || '',
            area: (img.naturalWidth || 0) * (img.naturalHeight || 0),
        }))
        .filter((e) => e.src)
        .sort((a, b) => b.area - a.area)
        .map((e) => e.src);
    let canvas = null;
    const el = document.querySelector('canvas');
    if (el) {
        try { canvas = el.toDataURL('image/png'); } catch (e) { canvas = null; }
    }
    return { images, canvas };
})()"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_escape_quotes() {
        assert_eq!(js_escape("plain-key"), "plain-key");
        assert_eq!(js_escape("it's"), "it\\'s");
        assert_eq!(js_escape("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_js_escape_script_breakout() {
        let escaped = js_escape("</script><script>");
        assert!(!escaped.contains("</script>"));
        assert!(escaped.contains("\\x3c"));
    }

    #[test]
    fn test_js_escape_strips_null() {
        assert_eq!(js_escape("a\0b"), "ab");
    }

    #[test]
    fn test_snippets_interpolate_key_placeholder() {
        for snippet in [LIST_LAYERS_JS, VERIFY_SELECTED_JS, CLICK_DIRECT_JS, CLICK_EVENTS_JS, CLICK_CHILD_JS] {
            assert!(snippet.contains("__KEY__"));
        }
        let script = CLICK_DIRECT_JS.replace("__KEY__", &js_escape("k-1"));
        assert!(script.contains("li[data-key=\"k-1\"]"));
        assert!(!script.contains("__KEY__"));
    }

    #[test]
    fn test_raw_entry_deserializes_page_shape() {
        let value = serde_json::json!([
            { "key": "c1", "background": "rgb(255, 0, 0)", "selected": true },
            { "key": "i2", "name": "Hair", "selected": false }
        ]);
        let entries: Vec<RawEntry> = serde_json::from_value(value).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].background.as_deref(), Some("rgb(255, 0, 0)"));
        assert_eq!(entries[1].name.as_deref(), Some("Hair"));
    }
}
