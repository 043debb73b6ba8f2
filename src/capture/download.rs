//! Filesystem capture sink.
//!
//! Persists emitted resources as `<root>/<destination>/<sequence>.<ext>`.
//! Writes run on spawned tasks so `persist` returns immediately; the engine
//! never blocks on persistence. Collisions are uniquified, failures logged.

use super::{CaptureRequest, CaptureSink};
use anyhow::{bail, Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Image extensions the sink recognizes in resource URLs.
const IMAGE_EXTENSIONS: [&str; 5] = ["jpeg", "jpg", "gif", "png", "webp"];

/// Sink that downloads resources under a root directory.
#[derive(Clone)]
pub struct FsCaptureSink {
    root: PathBuf,
    client: reqwest::Client,
}

impl FsCaptureSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch the resource bytes: HTTP(S) via the shared client, `data:`
    /// URLs decoded locally.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(encoded) = url.strip_prefix("data:") {
            let payload = encoded
                .split_once("base64,")
                .map(|(_, rest)| rest)
                .context("data URL is not base64-encoded")?;
            return base64::engine::general_purpose::STANDARD
                .decode(payload)
                .context("invalid base64 in data URL");
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            let resp = self.client.get(url).send().await?;
            if !resp.status().is_success() {
                bail!("resource fetch returned {}", resp.status());
            }
            return Ok(resp.bytes().await?.to_vec());
        }
        bail!("unsupported resource URL scheme: {url}")
    }

    /// Perform one write end to end. Runs on a spawned task.
    async fn write(&self, request: CaptureRequest) -> Result<()> {
        let ext = extension_from_url(&request.resource.url);
        let dir = self.root.join(&request.destination);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;

        let bytes = self.fetch(&request.resource.url).await?;
        let target = uniquify(&dir, request.sequence, ext);
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("writing {}", target.display()))?;

        debug!("captured {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

impl CaptureSink for FsCaptureSink {
    fn persist(&self, request: CaptureRequest) {
        let sink = self.clone();
        tokio::spawn(async move {
            let dest = format!("{}/{}", request.destination, request.sequence);
            if let Err(e) = sink.write(request).await {
                warn!("capture write failed for {dest}: {e:#}");
            }
        });
    }
}

/// First free file name for the sequence: `<seq>.<ext>`, then
/// `<seq> (1).<ext>`, `<seq> (2).<ext>`, … Collisions only occur when an
/// external writer raced us into the same folder; numbering itself never
/// repeats within a session.
fn uniquify(dir: &Path, sequence: u32, ext: &str) -> PathBuf {
    let plain = dir.join(format!("{sequence}.{ext}"));
    if !plain.exists() {
        return plain;
    }
    for n in 1u32.. {
        let candidate = dir.join(format!("{sequence} ({n}).{ext}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// Derive the file extension from a resource URL: last path component,
/// query string stripped, known image extensions only. Defaults to `jpg`.
pub fn extension_from_url(url: &str) -> &'static str {
    if url.starts_with("data:image/png") {
        return "png";
    }
    if url.starts_with("data:image/webp") {
        return "webp";
    }
    if url.starts_with("data:") {
        return "jpg";
    }
    let filename = url.rsplit('/').next().unwrap_or(url);
    let filename = filename.split('?').next().unwrap_or(filename);
    let ext = filename.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .find(|known| **known == ext)
        .copied()
        .unwrap_or("jpg")
}

/// Whether a URL looks like an emitted render worth capturing: an image
/// extension somewhere in the URL, and not an interface icon or logo.
pub fn is_capturable_url(url: &str) -> bool {
    if url.starts_with("data:image/") {
        return true;
    }
    let lower = url.to_ascii_lowercase();
    if lower.contains("icon") || lower.contains("logo") {
        return false;
    }
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lower.contains(&format!(".{ext}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ResourceDescriptor;
    use tempfile::TempDir;

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://cdn.example.com/a/render.png"), "png");
        assert_eq!(
            extension_from_url("https://cdn.example.com/render.JPEG?cache=1"),
            "jpeg"
        );
        assert_eq!(extension_from_url("https://example.com/no-extension"), "jpg");
        assert_eq!(extension_from_url("data:image/png;base64,AAAA"), "png");
    }

    #[test]
    fn test_is_capturable_url() {
        assert!(is_capturable_url("https://cdn.example.com/out/render.png"));
        assert!(is_capturable_url("data:image/png;base64,AAAA"));
        assert!(!is_capturable_url("https://cdn.example.com/ui/icon.png"));
        assert!(!is_capturable_url("https://cdn.example.com/logo.webp"));
        assert!(!is_capturable_url("https://example.com/styles.css"));
    }

    #[test]
    fn test_uniquify_skips_existing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            uniquify(dir.path(), 1, "png"),
            dir.path().join("1.png")
        );
        std::fs::write(dir.path().join("1.png"), b"x").unwrap();
        assert_eq!(
            uniquify(dir.path(), 1, "png"),
            dir.path().join("1 (1).png")
        );
    }

    #[tokio::test]
    async fn test_persist_data_url_writes_file() {
        let dir = TempDir::new().unwrap();
        let sink = FsCaptureSink::new(dir.path());
        let payload = base64::engine::general_purpose::STANDARD.encode(b"fake-png-bytes");
        sink.persist(CaptureRequest {
            destination: "Maker_1/Hair/FF0000".to_string(),
            sequence: 1,
            resource: ResourceDescriptor::new(format!("data:image/png;base64,{payload}")),
        });

        // persist is fire-and-forget; give the spawned write a moment.
        let target = dir.path().join("Maker_1/Hair/FF0000/1.png");
        for _ in 0..50 {
            if target.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read(&target).unwrap(), b"fake-png-bytes");
    }

    #[tokio::test]
    async fn test_fetch_rejects_unknown_scheme() {
        let sink = FsCaptureSink::new("/tmp");
        assert!(sink.fetch("ftp://example.com/a.png").await.is_err());
    }
}
