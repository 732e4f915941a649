//! Last.fm API client
//!
//! Everything goes through one GET endpoint selected by a `method` query
//! parameter. Responses are JSON; failures arrive either as an HTTP status
//! or as an `{error, message}` envelope, sometimes with status 200, so the
//! envelope is checked on every response.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use rockmix_common::{Error, Result, SourceKind};

use super::{result_confidence, ArtistInfo, MusicSource, TrackInfo, TrackMatch};

const KIND: SourceKind = SourceKind::Lastfm;
const DEFAULT_BASE_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct LastfmClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl LastfmClient {
    pub fn new() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client (system error)"),
        }
    }

    /// Point the client at a different endpoint, for proxies and tests.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        if self.api_key.is_empty() {
            return Err(Error::ApiKeyMissing { backend: KIND });
        }

        let mut query = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
        ];
        query.extend_from_slice(params);

        debug!(method, "querying last.fm");
        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::api_failed(KIND, 0, "network error", e))?;

        let status = response.status().as_u16();
        match status {
            429 => return Err(Error::ApiRateLimited { backend: KIND }),
            401 | 403 => return Err(Error::ApiUnauthorized { backend: KIND }),
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::api_failed(KIND, status, "failed to read response body", e))?;

        // Application-level errors can ride on any status, including 200.
        if let Ok(envelope) = serde_json::from_str::<ApiEnvelope>(&body) {
            if let Some(code) = envelope.error {
                return Err(envelope_error(code, envelope.message, status));
            }
        }

        if !(200..300).contains(&status) {
            return Err(Error::api_status(KIND, status, body));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::api_failed(KIND, status, "unexpected response shape", e))
    }
}

impl Default for LastfmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicSource for LastfmClient {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// The shared secret is only needed for signed write calls, which this
    /// client never makes.
    fn set_credentials(&mut self, key: &str, _secret: Option<&str>) {
        self.api_key = key.to_string();
    }

    async fn search_track(&self, artist: &str, title: &str) -> Result<TrackMatch> {
        let response: SearchResponse = self
            .request(
                "track.search",
                &[("artist", artist), ("track", title), ("limit", "1")],
            )
            .await?;

        let found = response
            .results
            .track_matches
            .track
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchFound {
                artist: artist.to_string(),
                title: title.to_string(),
            })?;

        let confidence = result_confidence(artist, title, &found.artist, &found.name);
        Ok(TrackMatch {
            track: TrackInfo {
                external_id: non_empty(found.mbid),
                source: KIND,
                artist: found.artist,
                title: found.name,
                album: None,
                rank: 1,
                playcount: found.listeners,
                duration: None,
                url: non_empty(found.url),
            },
            confidence,
        })
    }

    async fn top_tracks(&self, artist: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        let limit = limit.to_string();
        let response: TopTracksResponse = self
            .request(
                "artist.getTopTracks",
                &[("artist", artist), ("limit", limit.as_str())],
            )
            .await?;
        Ok(to_tracks(response.toptracks.track, artist))
    }

    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>> {
        let limit = limit.to_string();
        let response: SimilarTracksResponse = self
            .request(
                "track.getSimilar",
                &[("artist", artist), ("track", title), ("limit", limit.as_str())],
            )
            .await?;
        Ok(to_tracks(response.similartracks.track, artist))
    }

    async fn tag_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        let limit = limit.to_string();
        let response: TagTracksResponse = self
            .request(
                "tag.getTopTracks",
                &[("tag", tag), ("limit", limit.as_str())],
            )
            .await?;
        Ok(to_tracks(response.tracks.track, ""))
    }

    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo> {
        let response: ArtistInfoResponse =
            self.request("artist.getInfo", &[("artist", artist)]).await?;
        let info = response.artist;
        let stats = info.stats.unwrap_or_default();
        Ok(ArtistInfo {
            external_id: non_empty(info.mbid),
            name: info.name,
            listeners: stats.listeners,
            playcount: stats.playcount,
            tags: info
                .tags
                .map(|t| t.tag.into_iter().map(|t| t.name).collect())
                .unwrap_or_default(),
            url: non_empty(info.url),
        })
    }

    async fn similar_artists(&self, artist: &str, limit: usize) -> Result<Vec<ArtistInfo>> {
        let limit = limit.to_string();
        let response: SimilarArtistsResponse = self
            .request(
                "artist.getSimilar",
                &[("artist", artist), ("limit", limit.as_str())],
            )
            .await?;
        Ok(response
            .similarartists
            .artist
            .into_iter()
            .map(|a| ArtistInfo {
                external_id: non_empty(a.mbid),
                name: a.name,
                listeners: None,
                playcount: None,
                tags: Vec::new(),
                url: non_empty(a.url),
            })
            .collect())
    }
}

fn envelope_error(code: u32, message: Option<String>, status: u16) -> Error {
    match code {
        29 => Error::ApiRateLimited { backend: KIND },
        // invalid credentials in their various spellings
        4 | 9 | 10 | 17 | 26 => Error::ApiUnauthorized { backend: KIND },
        _ => Error::api_status(
            KIND,
            status,
            format!("error {}: {}", code, message.unwrap_or_default()),
        ),
    }
}

fn to_tracks(tracks: Vec<ApiTrack>, fallback_artist: &str) -> Vec<TrackInfo> {
    tracks
        .into_iter()
        .enumerate()
        .map(|(i, t)| TrackInfo {
            external_id: non_empty(t.mbid),
            source: KIND,
            artist: t
                .artist
                .map(|a| a.name)
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| fallback_artist.to_string()),
            title: t.name,
            album: None,
            rank: (i + 1) as u32,
            playcount: t.playcount,
            duration: t.duration.filter(|&d| d > 0).map(|d| d as u32),
            url: non_empty(t.url),
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Last.fm serializes most counters as strings; some endpoints use numbers.
fn de_count<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }))
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    error: Option<u32>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: SearchResults,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(rename = "trackmatches")]
    track_matches: SearchTrackList,
}

#[derive(Debug, Deserialize)]
struct SearchTrackList {
    #[serde(default)]
    track: Vec<SearchTrack>,
}

/// `track.search` reports the artist as a plain string.
#[derive(Debug, Deserialize)]
struct SearchTrack {
    name: String,
    artist: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    listeners: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct SimilarTracksResponse {
    similartracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct TagTracksResponse {
    tracks: TrackList,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    #[serde(default)]
    track: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, deserialize_with = "de_count")]
    playcount: Option<u64>,
    /// Track length in seconds; 0 means unknown
    #[serde(default, deserialize_with = "de_count")]
    duration: Option<u64>,
    #[serde(default)]
    artist: Option<ApiArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ApiArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArtistInfoResponse {
    artist: ApiArtistInfo,
}

#[derive(Debug, Deserialize)]
struct ApiArtistInfo {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    stats: Option<ApiArtistStats>,
    #[serde(default)]
    tags: Option<ApiTagList>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiArtistStats {
    #[serde(default, deserialize_with = "de_count")]
    listeners: Option<u64>,
    #[serde(default, deserialize_with = "de_count")]
    playcount: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiTagList {
    #[serde(default)]
    tag: Vec<ApiTag>,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SimilarArtistsResponse {
    similarartists: SimilarArtistList,
}

#[derive(Debug, Deserialize)]
struct SimilarArtistList {
    #[serde(default)]
    artist: Vec<ApiSimilarArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiSimilarArtist {
    name: String,
    #[serde(default)]
    mbid: Option<String>,
    #[serde(default)]
    url: Option<String>,
}
