//! Spotify Web API client
//!
//! Uses the client-credentials flow: a short-lived bearer token is fetched
//! from the accounts endpoint and cached until shortly before it expires.
//! The refresh is single-flight so concurrent callers do not stampede the
//! token endpoint. A 401 on a resource call clears the cache; the next call
//! fetches a fresh token.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use rockmix_common::{Error, Result, SourceKind};

use super::{result_confidence, ArtistInfo, MusicSource, TrackInfo, TrackMatch};

const KIND: SourceKind = SourceKind::Spotify;
const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
/// Tokens are treated as expired this long before the server says so, to
/// keep a token from dying mid-request.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    api_base_url: String,
    token_url: String,
    http: reqwest::Client,
    token: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl SpotifyClient {
    pub fn new() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client (system error)"),
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Point resource calls at a different endpoint.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Point the token fetch at a different endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Current bearer token, fetching a new one when the cache is empty or
    /// stale. Read lock first so the hot path never serializes.
    async fn token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.is_fresh() {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.token.write().await;
        // another caller may have refreshed while we waited for the lock
        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let fetched = self.fetch_token().await?;
        let access_token = fetched.access_token.clone();
        *cached = Some(fetched);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::ApiKeyMissing { backend: KIND });
        }

        debug!("fetching spotify access token");
        let basic =
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", basic))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| Error::api_failed(KIND, 0, "network error", e))?;

        let status = response.status().as_u16();
        match status {
            429 => return Err(Error::ApiRateLimited { backend: KIND }),
            // the accounts endpoint reports bad credentials as 400 invalid_client
            400 | 401 | 403 => return Err(Error::ApiUnauthorized { backend: KIND }),
            s if !(200..300).contains(&s) => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::api_status(KIND, s, body));
            }
            _ => {}
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::api_failed(KIND, status, "unexpected token response", e))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now()
                + Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = self.token().await?;
        let response = request
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| Error::api_failed(KIND, 0, "network error", e))?;

        let status = response.status().as_u16();
        match status {
            401 => {
                // token expired or was revoked; drop it so the next call
                // starts from a fresh fetch
                self.token.write().await.take();
                return Err(Error::ApiUnauthorized { backend: KIND });
            }
            403 => return Err(Error::ApiUnauthorized { backend: KIND }),
            429 => return Err(Error::ApiRateLimited { backend: KIND }),
            s if !(200..300).contains(&s) => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::api_status(KIND, s, body));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| Error::api_failed(KIND, status, "unexpected response shape", e))
    }

    /// Resolve an artist name to its Spotify id via artist search.
    async fn find_artist(&self, artist: &str) -> Result<ApiArtist> {
        let response: SearchArtistsResponse = self
            .get_json(
                self.http
                    .get(format!("{}/search", self.api_base_url))
                    .query(&[("q", artist), ("type", "artist"), ("limit", "1")]),
            )
            .await?;

        response
            .artists
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchFound {
                artist: artist.to_string(),
                title: String::new(),
            })
    }
}

impl Default for SpotifyClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicSource for SpotifyClient {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn set_credentials(&mut self, key: &str, secret: Option<&str>) {
        self.client_id = key.to_string();
        self.client_secret = secret.unwrap_or_default().to_string();
        // credentials changed, any cached token is for the old pair
        if let Ok(mut cached) = self.token.try_write() {
            cached.take();
        }
    }

    async fn search_track(&self, artist: &str, title: &str) -> Result<TrackMatch> {
        let query = format!("artist:{} track:{}", artist, title);
        let response: SearchTracksResponse = self
            .get_json(
                self.http
                    .get(format!("{}/search", self.api_base_url))
                    .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")]),
            )
            .await?;

        let found = response
            .tracks
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchFound {
                artist: artist.to_string(),
                title: title.to_string(),
            })?;

        let track = to_track(found, 1, artist);
        let confidence = result_confidence(artist, title, &track.artist, &track.title);
        Ok(TrackMatch { track, confidence })
    }

    async fn top_tracks(&self, artist: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        let found = self.find_artist(artist).await?;
        let response: TracksResponse = self
            .get_json(
                self.http
                    .get(format!(
                        "{}/artists/{}/top-tracks",
                        self.api_base_url, found.id
                    ))
                    .query(&[("market", "US")]),
            )
            .await?;

        let mut tracks: Vec<TrackInfo> = response
            .tracks
            .into_iter()
            .enumerate()
            .map(|(i, t)| to_track(t, (i + 1) as u32, artist))
            .collect();
        tracks.truncate(limit);
        Ok(tracks)
    }

    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>> {
        let seed = self.search_track(artist, title).await?;
        let seed_id = seed.track.external_id.ok_or_else(|| Error::NoMatchFound {
            artist: artist.to_string(),
            title: title.to_string(),
        })?;

        let limit = limit.to_string();
        let response: TracksResponse = self
            .get_json(
                self.http
                    .get(format!("{}/recommendations", self.api_base_url))
                    .query(&[("seed_tracks", seed_id.as_str()), ("limit", limit.as_str())]),
            )
            .await?;

        Ok(response
            .tracks
            .into_iter()
            .enumerate()
            .map(|(i, t)| to_track(t, (i + 1) as u32, artist))
            .collect())
    }

    async fn tag_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        // recommendation genre seeds are lowercase slugs
        let genre = tag.to_lowercase();
        let limit = limit.to_string();
        let response: TracksResponse = self
            .get_json(
                self.http
                    .get(format!("{}/recommendations", self.api_base_url))
                    .query(&[("seed_genres", genre.as_str()), ("limit", limit.as_str())]),
            )
            .await?;

        Ok(response
            .tracks
            .into_iter()
            .enumerate()
            .map(|(i, t)| to_track(t, (i + 1) as u32, ""))
            .collect())
    }

    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo> {
        let found = self.find_artist(artist).await?;
        let full: ApiArtist = self
            .get_json(
                self.http
                    .get(format!("{}/artists/{}", self.api_base_url, found.id)),
            )
            .await?;
        Ok(to_artist(full))
    }

    async fn similar_artists(&self, artist: &str, limit: usize) -> Result<Vec<ArtistInfo>> {
        let found = self.find_artist(artist).await?;
        let response: ArtistsResponse = self
            .get_json(self.http.get(format!(
                "{}/artists/{}/related-artists",
                self.api_base_url, found.id
            )))
            .await?;

        let mut artists: Vec<ArtistInfo> = response.artists.into_iter().map(to_artist).collect();
        artists.truncate(limit);
        Ok(artists)
    }
}

fn to_track(track: ApiTrack, rank: u32, seed_artist: &str) -> TrackInfo {
    TrackInfo {
        external_id: Some(track.id).filter(|id| !id.is_empty()),
        source: KIND,
        // local-file and some market-filtered tracks come with no artists
        artist: track
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| seed_artist.to_string()),
        title: track.name,
        album: track.album.map(|a| a.name),
        rank,
        playcount: None,
        duration: track.duration_ms.map(|ms| (ms / 1000) as u32),
        url: track.external_urls.spotify,
    }
}

fn to_artist(artist: ApiArtist) -> ArtistInfo {
    ArtistInfo {
        external_id: Some(artist.id).filter(|id| !id.is_empty()),
        name: artist.name,
        listeners: artist.followers.and_then(|f| f.total),
        playcount: None,
        tags: artist.genres,
        url: artist.external_urls.spotify,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchTracksResponse {
    tracks: Paging<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct SearchArtistsResponse {
    artists: Paging<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default)]
    items: Vec<T>,
}

/// `top-tracks` and `recommendations` return a flat track array.
#[derive(Debug, Deserialize)]
struct TracksResponse {
    #[serde(default)]
    tracks: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ArtistsResponse {
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiTrack {
    id: String,
    name: String,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    artists: Vec<ApiArtistRef>,
    #[serde(default)]
    album: Option<ApiAlbumRef>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ApiArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbumRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiArtist {
    id: String,
    name: String,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    followers: Option<Followers>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Followers {
    #[serde(default)]
    total: Option<u64>,
}
