//! Filesystem fallback scanner
//!
//! When the device has no readable TagCache the catalog is built from a
//! plain directory walk instead. Metadata is limited to what a path can
//! carry: a `Artist - Title` basename split and the file size.

use std::path::Path;

use rockmix_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::db::songs::NewSong;

/// Extensions accepted as audio, compared case-insensitively.
const AUDIO_EXTENSIONS: [&str; 10] = [
    "mp3", "flac", "ogg", "m4a", "aac", "wav", "wma", "ape", "mpc", "opus",
];

/// Result of a fallback scan.
#[derive(Debug)]
pub struct ScanOutcome {
    pub tracks: Vec<NewSong>,
    /// Files seen but not accepted as audio
    pub skipped: u64,
}

/// Walk the device tree and build catalog entries from file names.
///
/// Dot-directories (`.rockbox`, `.Trashes`, ..) are pruned wholesale; the
/// root itself is exempt so a dot-named mount point still scans. Paths are
/// stored device-relative with forward slashes and a leading `/`.
pub fn scan_device(device_root: &Path, cancel: &CancellationToken) -> Result<ScanOutcome> {
    if !device_root.is_dir() {
        return Err(Error::RockboxPathInvalid(device_root.to_path_buf()));
    }

    let mut tracks = Vec::new();
    let mut skipped = 0u64;

    let walker = WalkDir::new(device_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(Error::OperationCancelled);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("error accessing entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !has_audio_extension(entry.path()) {
            skipped += 1;
            continue;
        }

        let file_size = match entry.metadata() {
            Ok(meta) => Some(meta.len() as i64),
            Err(e) => {
                warn!(path = %entry.path().display(), "cannot stat file: {e}");
                None
            }
        };

        let device_path = device_relative_path(entry.path(), device_root);
        let (artist, title) = split_basename(entry.path());
        tracks.push(NewSong {
            title,
            artist,
            file_size,
            ..NewSong::new(device_path)
        });
    }

    debug!(
        tracks = tracks.len(),
        skipped, "fallback filesystem scan complete"
    );
    Ok(ScanOutcome { tracks, skipped })
}

fn keep_entry(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    !entry.file_name().to_string_lossy().starts_with('.')
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// `/Music/Queen/track.mp3` regardless of the host platform's separators.
fn device_relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Split a basename once on ` - ` into artist and title; otherwise the whole
/// stem becomes the title.
fn split_basename(path: &Path) -> (Option<String>, Option<String>) {
    let stem = match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => return (None, None),
    };
    match stem.split_once(" - ") {
        Some((artist, title)) => (
            Some(artist.trim().to_string()),
            Some(title.trim().to_string()),
        ),
        None => (None, Some(stem.trim().to_string())),
    }
}
