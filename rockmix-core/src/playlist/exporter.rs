//! Extended M3U export
//!
//! Rockbox picks up playlists from a `Playlists` directory at the device
//! root. Files are UTF-8 `.m3u8` with `\n` line endings; paths inside are
//! the device-relative song paths the catalog stores, which is what the
//! firmware resolves them against.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sqlx::SqlitePool;
use tracing::info;

use rockmix_common::db::Song;
use rockmix_common::Result;

use crate::db::playlists;

/// Directory under the device root that Rockbox scans for playlists.
pub const PLAYLIST_DIR: &str = "Playlists";

/// Longest allowed filename stem; FAT volumes cap at 255 with headroom for
/// the extension.
const MAX_FILENAME_CHARS: usize = 200;

/// Replace filesystem-hostile characters and bound the length.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    cleaned.chars().take(MAX_FILENAME_CHARS).collect()
}

/// Render the playlist body. Unknown durations become `-1`, which players
/// treat as "don't show a length".
pub fn render_m3u8(name: &str, songs: &[Song]) -> String {
    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    let _ = writeln!(out, "#PLAYLIST:{}", name);
    out.push('\n');
    for song in songs {
        let seconds = song.duration.unwrap_or(-1);
        let _ = writeln!(out, "#EXTINF:{},{}", seconds, song.display_label());
        out.push_str(&song.path);
        out.push('\n');
    }
    out
}

/// Write the playlist file onto the device and record where it landed.
pub async fn export_playlist(
    pool: &SqlitePool,
    device_root: &Path,
    playlist_id: i64,
) -> Result<PathBuf> {
    let playlist = playlists::find_by_id(pool, playlist_id).await?;
    let songs = playlists::songs_for_playlist(pool, playlist_id).await?;

    let dir = device_root.join(PLAYLIST_DIR);
    let file = dir.join(format!("{}.m3u8", sanitize_filename(&playlist.name)));
    let content = render_m3u8(&playlist.name, &songs);

    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(&file, content.as_bytes()).await?;

    playlists::mark_exported(pool, playlist_id, &file.to_string_lossy()).await?;
    info!(
        playlist = %playlist.name,
        path = %file.display(),
        songs = songs.len(),
        "playlist exported"
    );

    Ok(file)
}
