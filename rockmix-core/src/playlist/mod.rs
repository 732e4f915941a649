//! Playlist assembly and export
//!
//! A generate request names a playlist type, a backend, and a seed. The
//! generator fetches candidate tracks from the backend, matches them
//! against the catalog, persists the playlist, and hands it to the exporter
//! which writes the `.m3u8` file onto the device.

pub mod exporter;
pub mod generator;

pub use exporter::{export_playlist, render_m3u8, sanitize_filename};
pub use generator::{fetch_tracks, generate, generate_from_tracks};

use serde::{Deserialize, Serialize};

use rockmix_common::db::Playlist;
use rockmix_common::{Error, PlaylistType, Result, SourceKind};

/// Default track count when a request carries none.
pub const DEFAULT_LIMIT: usize = 50;

/// One playlist generation request, as a front-end would send it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub playlist_type: PlaylistType,
    pub source: SourceKind,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Desired track count; missing, zero or negative means the default
    #[serde(default)]
    pub limit: Option<i64>,
}

impl GenerateRequest {
    /// Requested track count clamped to something usable.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(n) if n > 0 => n as usize,
            _ => DEFAULT_LIMIT,
        }
    }

    /// Check the seed fields the playlist type needs are present.
    pub fn validate(&self) -> Result<()> {
        match self.playlist_type {
            PlaylistType::Tag => {
                if self.tag.as_deref().map_or(true, |t| t.trim().is_empty()) {
                    return Err(Error::TagRequired);
                }
            }
            _ => {
                if self.artist.as_deref().map_or(true, |a| a.trim().is_empty()) {
                    return Err(Error::InvalidInput(format!(
                        "artist is required for {} playlists",
                        self.playlist_type
                    )));
                }
            }
        }
        Ok(())
    }

    /// Seed string the request revolves around. Valid requests always have
    /// one; an unvalidated request degrades to an empty seed.
    pub fn seed(&self) -> &str {
        let field = match self.playlist_type {
            PlaylistType::Tag => &self.tag,
            _ => &self.artist,
        };
        field.as_deref().map(str::trim).unwrap_or("")
    }

    /// Human-readable playlist name, e.g. `Top Songs - Metallica (Last.fm)`.
    pub fn playlist_name(&self) -> String {
        let source = self.source.display_name();
        match self.playlist_type {
            PlaylistType::TopSongs => format!("Top Songs - {} ({})", self.seed(), source),
            PlaylistType::Mixed => format!("Mixed - {} ({})", self.seed(), source),
            PlaylistType::Similar => format!("Similar to {} ({})", self.seed(), source),
            PlaylistType::Tag => format!("Tag: {} ({})", self.seed(), source),
        }
    }
}

/// What one generate run did, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateReport {
    pub playlist: Playlist,
    /// Track count the request asked for
    pub requested: usize,
    /// Tracks the backend returned after deduplication
    pub fetched: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub match_rate: f64,
    pub exported_path: String,
}
