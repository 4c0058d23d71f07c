#![forbid(unsafe_code)]

//! Final on-disk locations for fetched artifacts.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Stem used when a title sanitizes down to nothing.
pub const FALLBACK_STEM: &str = "untitled";

/// `{directory}/{sanitized_title}.{extension}`. The caller owns creating the
/// directory.
pub fn artifact_path(directory: &Path, sanitized_title: &str, extension: &str) -> PathBuf {
    let stem = if sanitized_title.is_empty() {
        FALLBACK_STEM
    } else {
        sanitized_title
    };
    directory.join(format!("{stem}.{extension}"))
}

/// Moves `from` onto `to`, removing whatever already sits at `to` first so a
/// collision overwrites instead of failing.
pub fn replace_file(from: &Path, to: &Path) -> Result<()> {
    if to.exists() {
        fs::remove_file(to).with_context(|| format!("removing previous {}", to.display()))?;
    }
    if fs::rename(from, to).is_err() {
        // Staging may sit on another filesystem when the caller picked it.
        fs::copy(from, to)
            .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
        fs::remove_file(from).with_context(|| format!("removing {}", from.display()))?;
    }
    Ok(())
}

/// Swaps a container extension for the one the post-processor produces.
/// `.webm` audio ends up as `.mp3`; `.webm`/`.mkv` video ends up as `.mp4`.
pub fn normalize_extension(path: &Path, target: &str) -> PathBuf {
    let renamable: &[&str] = match target {
        "mp3" => &["webm", "m4a", "opus"],
        "mp4" => &["webm", "mkv"],
        _ => &[],
    };
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if renamable.contains(&ext) => path.with_extension(target),
        _ => path.to_path_buf(),
    }
}
