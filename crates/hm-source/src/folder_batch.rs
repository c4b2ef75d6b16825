//! Audio file discovery for batch runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Extensions symphonia is built to decode here.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "mp4", "mkv"];

/// True if `path` has a known audio extension (case-insensitive).
#[must_use]
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.iter().any(|k| k.eq_ignore_ascii_case(e)))
}

/// Audio files directly inside `dir`, sorted by path. Not recursive.
///
/// # Errors
/// Returns an error if the directory cannot be read.
pub fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Cannot read directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Cannot list {}", dir.display()))?
            .path();
        if path.is_file() && is_audio_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    log::info!("Found {} audio files in {}", files.len(), dir.display());
    Ok(files)
}

/// Expand a mix of files and directories into a flat, deduplicated file list.
///
/// # Errors
/// Returns an error if a directory cannot be read or a path does not exist.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(collect_audio_files(input)?);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            anyhow::bail!("Input not found: {}", input.display());
        }
    }
    files.dedup();
    Ok(files)
}
