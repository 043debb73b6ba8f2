//! Destination path resolution.
//!
//! A pure mapping from traversal context to a folder path string. Paths are
//! derived, never stored: the engine recomputes one per unit of work.

/// Traversal context for one capture.
#[derive(Debug, Clone)]
pub struct PathContext<'a> {
    pub maker_id: &'a str,
    pub item_name: Option<&'a str>,
    pub color_hex: Option<&'a str>,
    pub layer_name: Option<&'a str>,
    /// Whether the current activation has a color palette. When false the
    /// color segment is omitted even if a hex value is incidentally present
    /// — the explicit flag wins.
    pub has_color_palette: bool,
}

/// Resolve a destination path: `Maker_<id>/<item>/<color?>/<layer?>`.
///
/// Free-text segments are sanitized; segments that sanitize to nothing are
/// skipped. Resolving the same context twice yields an identical path.
pub fn resolve(ctx: &PathContext<'_>) -> String {
    let mut path = format!("Maker_{}", sanitize_segment(ctx.maker_id));

    if let Some(item) = ctx.item_name {
        push_segment(&mut path, item);
    }
    if ctx.has_color_palette {
        if let Some(hex) = ctx.color_hex {
            push_segment(&mut path, hex);
        }
    }
    if let Some(layer) = ctx.layer_name {
        push_segment(&mut path, layer);
    }

    path
}

fn push_segment(path: &mut String, raw: &str) {
    let clean = sanitize_segment(raw);
    if !clean.is_empty() {
        path.push('/');
        path.push_str(&clean);
    }
}

/// Replace characters that are illegal in folder names and trim whitespace.
pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        item: Option<&'a str>,
        color: Option<&'a str>,
        layer: Option<&'a str>,
        palette: bool,
    ) -> PathContext<'a> {
        PathContext {
            maker_id: "12345",
            item_name: item,
            color_hex: color,
            layer_name: layer,
            has_color_palette: palette,
        }
    }

    #[test]
    fn test_full_path() {
        let path = resolve(&ctx(Some("Hair"), Some("FF0000"), Some("Back"), true));
        assert_eq!(path, "Maker_12345/Hair/FF0000/Back");
    }

    #[test]
    fn test_item_only() {
        let path = resolve(&ctx(Some("Nose"), None, None, false));
        assert_eq!(path, "Maker_12345/Nose");
    }

    #[test]
    fn test_palette_flag_overrides_incidental_hex() {
        // A stale hex from a previous scan must not produce a color folder.
        let path = resolve(&ctx(Some("Nose"), Some("00FF00"), None, false));
        assert_eq!(path, "Maker_12345/Nose");
    }

    #[test]
    fn test_sanitizes_illegal_characters() {
        let path = resolve(&ctx(Some("Eyes: left/right?"), None, None, false));
        assert_eq!(path, "Maker_12345/Eyes_ left_right_");
    }

    #[test]
    fn test_trims_whitespace() {
        let path = resolve(&ctx(Some("  Mouth  "), None, None, false));
        assert_eq!(path, "Maker_12345/Mouth");
    }

    #[test]
    fn test_empty_segment_skipped() {
        let path = resolve(&ctx(Some("   "), Some("FF0000"), None, true));
        assert_eq!(path, "Maker_12345/FF0000");
    }

    #[test]
    fn test_idempotent() {
        let c = ctx(Some("Hair"), Some("AABBCC"), Some("Front"), true);
        assert_eq!(resolve(&c), resolve(&c));
    }
}
