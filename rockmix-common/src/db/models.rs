//! Database models

use serde::{Deserialize, Serialize};

use crate::types::{PlaylistType, SourceKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// One track in the device catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    /// MD5 hex digest of the device-relative path, stable across re-parses
    pub device_id: String,
    /// Device-relative path with forward slashes, rooted at `/`
    pub path: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub comment: Option<String>,
    pub year: Option<i64>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    /// Track length in whole seconds
    pub duration: Option<i64>,
    pub bitrate: Option<i64>,
    pub play_count: Option<i64>,
    pub rating: Option<i64>,
    pub file_size: Option<i64>,
    pub lastfm_id: Option<String>,
    pub spotify_id: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub matched_source: Option<String>,
    pub matched_at: Option<String>,
    pub match_confidence: Option<f64>,
}

impl Song {
    /// Artist used for matching: the album artist when present, since per-track
    /// artist tags often carry featured-guest noise.
    pub fn effective_artist(&self) -> &str {
        match &self.album_artist {
            Some(a) if !a.is_empty() => a,
            _ => self.artist.as_deref().unwrap_or(""),
        }
    }

    /// Human-readable label: `artist - title`, degrading to the title alone,
    /// then to the device path when no tags survive.
    pub fn display_label(&self) -> String {
        let title = self.title.as_deref().unwrap_or("");
        let artist = self.artist.as_deref().unwrap_or("");
        if title.is_empty() {
            self.path.clone()
        } else if artist.is_empty() {
            title.to_string()
        } else {
            format!("{artist} - {title}")
        }
    }

    /// External ID recorded for the given backend, if any.
    pub fn external_id(&self, source: SourceKind) -> Option<&str> {
        let id = match source {
            SourceKind::Lastfm => self.lastfm_id.as_deref(),
            SourceKind::Spotify => self.spotify_id.as_deref(),
            SourceKind::Musicbrainz => self.musicbrainz_id.as_deref(),
        };
        id.filter(|s| !s.is_empty())
    }
}

/// One generated playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub playlist_type: PlaylistType,
    pub source: SourceKind,
    pub seed_artist: Option<String>,
    pub seed_tag: Option<String>,
    pub song_count: i64,
    pub generated_at: Option<String>,
    pub exported_at: Option<String>,
    pub exported_path: Option<String>,
    pub created_at: String,
}
