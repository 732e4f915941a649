//! External recommendation backends
//!
//! Each backend client speaks its own HTTP API but exposes the same
//! capability surface. Where an API has no native endpoint for a capability
//! (MusicBrainz has no "similar tracks", Spotify has no tag charts) the
//! client emulates it from the endpoints it does have; callers never see a
//! protocol error for an unsupported capability.

pub mod lastfm;
pub mod musicbrainz;
pub mod spotify;

pub use lastfm::LastfmClient;
pub use musicbrainz::MusicbrainzClient;
pub use spotify::SpotifyClient;

use async_trait::async_trait;
use rockmix_common::{Result, SourceKind};
use serde::{Deserialize, Serialize};

use crate::matcher;

/// One track as returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Backend-specific identifier (Spotify track id, MusicBrainz recording
    /// id, ..); Last.fm tracks usually have none.
    pub external_id: Option<String>,
    pub source: SourceKind,
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
    /// 1-based position in the list the backend returned
    pub rank: u32,
    pub playcount: Option<u64>,
    /// Track length in seconds, when the backend reports one
    pub duration: Option<u32>,
    pub url: Option<String>,
}

/// A track found by `search_track`, with how well it fits the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMatch {
    pub track: TrackInfo,
    /// In [0,1]; mean of artist and title similarity against the query
    pub confidence: f64,
}

/// One artist as returned by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub external_id: Option<String>,
    pub name: String,
    pub listeners: Option<u64>,
    pub playcount: Option<u64>,
    /// Top tags / genres, most relevant first
    pub tags: Vec<String>,
    pub url: Option<String>,
}

/// Capability surface shared by all backends.
#[async_trait]
pub trait MusicSource {
    fn kind(&self) -> SourceKind;

    /// True when enough credentials are present to make requests.
    fn is_configured(&self) -> bool;

    /// Install credentials. The meaning of `key`/`secret` is per backend:
    /// API key + shared secret (Last.fm), client id + client secret
    /// (Spotify), contact User-Agent (MusicBrainz, no secret).
    fn set_credentials(&mut self, key: &str, secret: Option<&str>);

    /// Find the backend's best match for one catalog song.
    async fn search_track(&self, artist: &str, title: &str) -> Result<TrackMatch>;

    /// Most popular tracks of an artist.
    async fn top_tracks(&self, artist: &str, limit: usize) -> Result<Vec<TrackInfo>>;

    /// Tracks similar to the given one.
    async fn similar_tracks(&self, artist: &str, title: &str, limit: usize)
        -> Result<Vec<TrackInfo>>;

    /// Popular tracks for a genre tag.
    async fn tag_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackInfo>>;

    /// Profile of one artist.
    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo>;

    /// Artists similar to the given one.
    async fn similar_artists(&self, artist: &str, limit: usize) -> Result<Vec<ArtistInfo>>;
}

/// Tagged dispatch over the concrete clients.
///
/// The set of backends is closed, so an enum keeps dispatch transparent and
/// lets the registry own clients by value.
#[derive(Debug, Clone)]
pub enum SourceClient {
    Lastfm(LastfmClient),
    Spotify(SpotifyClient),
    Musicbrainz(MusicbrainzClient),
}

macro_rules! delegate {
    ($self:ident, $client:ident => $body:expr) => {
        match $self {
            SourceClient::Lastfm($client) => $body,
            SourceClient::Spotify($client) => $body,
            SourceClient::Musicbrainz($client) => $body,
        }
    };
}

#[async_trait]
impl MusicSource for SourceClient {
    fn kind(&self) -> SourceKind {
        delegate!(self, c => c.kind())
    }

    fn is_configured(&self) -> bool {
        delegate!(self, c => c.is_configured())
    }

    fn set_credentials(&mut self, key: &str, secret: Option<&str>) {
        delegate!(self, c => c.set_credentials(key, secret))
    }

    async fn search_track(&self, artist: &str, title: &str) -> Result<TrackMatch> {
        delegate!(self, c => c.search_track(artist, title).await)
    }

    async fn top_tracks(&self, artist: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        delegate!(self, c => c.top_tracks(artist, limit).await)
    }

    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>> {
        delegate!(self, c => c.similar_tracks(artist, title, limit).await)
    }

    async fn tag_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        delegate!(self, c => c.tag_tracks(tag, limit).await)
    }

    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo> {
        delegate!(self, c => c.artist_info(artist).await)
    }

    async fn similar_artists(&self, artist: &str, limit: usize) -> Result<Vec<ArtistInfo>> {
        delegate!(self, c => c.similar_artists(artist, limit).await)
    }
}

/// Confidence that a backend result answers the query it was made for.
pub(crate) fn result_confidence(
    query_artist: &str,
    query_title: &str,
    found_artist: &str,
    found_title: &str,
) -> f64 {
    (matcher::similarity(query_artist, found_artist) + matcher::similarity(query_title, found_title))
        / 2.0
}
