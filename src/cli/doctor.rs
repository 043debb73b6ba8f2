//! Environment readiness check.

use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;

/// Check Chromium availability and output-root writability.
pub async fn run(out: &Path) -> Result<()> {
    println!("Colorloop Doctor");
    println!("================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    // Check Chromium
    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set COLORLOOP_CHROMIUM_PATH."
        ),
    }

    // Check output root
    let out_ok = match ensure_writable(out) {
        Ok(()) => {
            println!("[OK] Output root writable: {}", out.display());
            true
        }
        Err(e) => {
            println!("[!!] Output root not writable: {} ({e})", out.display());
            false
        }
    };

    println!();
    if chromium_path.is_some() && out_ok {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

fn ensure_writable(out: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(out)?;
    let probe = out.join(".colorloop-doctor");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_writable_creates_missing_dirs() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        assert!(ensure_writable(&nested).is_ok());
        assert!(nested.exists());
    }
}
