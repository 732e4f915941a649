//! Shared vocabulary types
//!
//! The backend and playlist-type enums are used across configuration keys,
//! database columns, error variants and requests, so they live here rather
//! than in the core crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// External catalog backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Lastfm,
    Spotify,
    Musicbrainz,
}

impl SourceKind {
    /// All known backends, in registration order.
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Lastfm,
        SourceKind::Spotify,
        SourceKind::Musicbrainz,
    ];

    /// Stable identifier used in configuration keys and database columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Lastfm => "lastfm",
            SourceKind::Spotify => "spotify",
            SourceKind::Musicbrainz => "musicbrainz",
        }
    }

    /// Human-readable name used in playlist titles and log lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Lastfm => "Last.fm",
            SourceKind::Spotify => "Spotify",
            SourceKind::Musicbrainz => "MusicBrainz",
        }
    }

    /// Configuration key holding the enabled flag for this backend.
    pub fn enabled_key(&self) -> String {
        format!("{}_enabled", self.as_str())
    }

    /// Configuration key holding the primary credential.
    ///
    /// MusicBrainz has no API key; it requires a contact User-Agent instead,
    /// which is stored under the same slot.
    pub fn credential_key(&self) -> &'static str {
        match self {
            SourceKind::Lastfm => "lastfm_api_key",
            SourceKind::Spotify => "spotify_client_id",
            SourceKind::Musicbrainz => "musicbrainz_user_agent",
        }
    }

    /// Configuration key holding the secondary credential, when the backend
    /// uses one.
    pub fn credential_secret_key(&self) -> Option<&'static str> {
        match self {
            SourceKind::Lastfm => Some("lastfm_api_secret"),
            SourceKind::Spotify => Some("spotify_client_secret"),
            SourceKind::Musicbrainz => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lastfm" | "last.fm" => Ok(SourceKind::Lastfm),
            "spotify" => Ok(SourceKind::Spotify),
            "musicbrainz" => Ok(SourceKind::Musicbrainz),
            _ => Err(Error::InvalidDataSource(s.to_string())),
        }
    }
}

/// Kind of playlist a generate request produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistType {
    /// Most popular tracks of a single artist
    TopSongs,
    /// Half top tracks, half tracks similar to the artist's biggest hit
    Mixed,
    /// Top tracks of artists similar to the seed artist
    Similar,
    /// Top tracks for a genre tag
    Tag,
}

impl PlaylistType {
    /// Stable identifier stored in the playlists table.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistType::TopSongs => "top_songs",
            PlaylistType::Mixed => "mixed",
            PlaylistType::Similar => "similar",
            PlaylistType::Tag => "tag",
        }
    }

    /// Display form used when composing playlist names.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlaylistType::TopSongs => "Top Songs",
            PlaylistType::Mixed => "Mixed",
            PlaylistType::Similar => "Similar",
            PlaylistType::Tag => "Tag",
        }
    }
}

impl fmt::Display for PlaylistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaylistType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top_songs" | "top-songs" | "topsongs" => Ok(PlaylistType::TopSongs),
            "mixed" => Ok(PlaylistType::Mixed),
            "similar" => Ok(PlaylistType::Similar),
            "tag" => Ok(PlaylistType::Tag),
            _ => Err(Error::InvalidPlaylistType(s.to_string())),
        }
    }
}
