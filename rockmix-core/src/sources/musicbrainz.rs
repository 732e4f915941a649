//! MusicBrainz API client
//!
//! MusicBrainz needs no API key but requires a contact User-Agent and caps
//! anonymous clients at roughly one request per second. The limit is
//! enforced client-side so a burst of calls never trips the server into
//! 503s. Queries use Lucene syntax, so user text is escaped before it is
//! spliced into a query.
//!
//! The API has no popularity or similarity endpoints; those capabilities
//! are emulated from search (see the per-method notes).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use rockmix_common::{Error, Result, SourceKind};

use super::{result_confidence, ArtistInfo, MusicSource, TrackInfo, TrackMatch};

const KIND: SourceKind = SourceKind::Musicbrainz;
const DEFAULT_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
// 1.1 s keeps us safely under the documented 1 req/s cap
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100);

/// Characters with meaning in Lucene query syntax.
const LUCENE_SPECIALS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\', '/',
];

/// Spaces successive requests at least `min_interval` apart.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the rate limit.
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!(?wait_time, "rate limiting musicbrainz request");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Clone)]
pub struct MusicbrainzClient {
    /// Contact string sent as User-Agent, e.g. `rockmix/0.1 (me@example.org)`
    user_agent: String,
    base_url: String,
    http: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl std::fmt::Debug for MusicbrainzClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicbrainzClient")
            .field("user_agent", &self.user_agent)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl MusicbrainzClient {
    pub fn new() -> Self {
        Self {
            user_agent: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client (system error)"),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_INTERVAL)),
        }
    }

    /// Point the client at a different endpoint, for local mirrors and
    /// tests. MusicBrainz mirrors lift the public rate limit but the
    /// client keeps its spacing either way.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        if self.user_agent.is_empty() {
            return Err(Error::ApiKeyMissing { backend: KIND });
        }

        self.rate_limiter.wait().await;

        let url = format!("{}{}", self.base_url, path);
        let mut query = params.to_vec();
        query.push(("fmt", "json"));

        debug!(path, "querying musicbrainz");
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::api_failed(KIND, 0, "network error", e))?;

        let status = response.status().as_u16();
        match status {
            // the server answers overload with 503 rather than 429
            429 | 503 => return Err(Error::ApiRateLimited { backend: KIND }),
            401 | 403 => return Err(Error::ApiUnauthorized { backend: KIND }),
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

    async fn find_artist(&self, artist: &str) -> Result<ApiArtist> {
        let query = format!("artist:\"{}\"", escape_lucene(artist));
        let response: ArtistSearchResponse = self
            .get_json("/artist", &[("query", query.as_str()), ("limit", "1")])
            .await?;

        response
            .artists
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchFound {
                artist: artist.to_string(),
                title: String::new(),
            })
    }
}

impl Default for MusicbrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MusicSource for MusicbrainzClient {
    fn kind(&self) -> SourceKind {
        KIND
    }

    fn is_configured(&self) -> bool {
        !self.user_agent.is_empty()
    }

    /// MusicBrainz has no key; the "credential" is the contact User-Agent.
    fn set_credentials(&mut self, key: &str, _secret: Option<&str>) {
        self.user_agent = key.to_string();
    }

    async fn search_track(&self, artist: &str, title: &str) -> Result<TrackMatch> {
        let query = format!(
            "recording:\"{}\" AND artist:\"{}\"",
            escape_lucene(title),
            escape_lucene(artist)
        );
        let response: RecordingSearchResponse = self
            .get_json("/recording", &[("query", query.as_str()), ("limit", "1")])
            .await?;

        let found = response
            .recordings
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchFound {
                artist: artist.to_string(),
                title: title.to_string(),
            })?;

        let track = to_track(found, 1);
        let confidence = result_confidence(artist, title, &track.artist, &track.title);
        Ok(TrackMatch { track, confidence })
    }

    /// There is no popularity ranking; recordings credited to the artist in
    /// search-relevance order stand in for "top".
    async fn top_tracks(&self, artist: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        let found = self.find_artist(artist).await?;
        let query = format!("arid:{}", found.id);
        let limit = limit.to_string();
        let response: RecordingSearchResponse = self
            .get_json(
                "/recording",
                &[("query", query.as_str()), ("limit", limit.as_str())],
            )
            .await?;

        Ok(response
            .recordings
            .into_iter()
            .enumerate()
            .map(|(i, r)| to_track(r, (i + 1) as u32))
            .collect())
    }

    /// Emulated as other recordings of the same artist, the seed filtered out.
    async fn similar_tracks(
        &self,
        artist: &str,
        title: &str,
        limit: usize,
    ) -> Result<Vec<TrackInfo>> {
        let seed_title = title.to_lowercase();
        let mut tracks = self.top_tracks(artist, limit + 1).await?;
        tracks.retain(|t| t.title.to_lowercase() != seed_title);
        tracks.truncate(limit);
        for (i, track) in tracks.iter_mut().enumerate() {
            track.rank = (i + 1) as u32;
        }
        Ok(tracks)
    }

    async fn tag_tracks(&self, tag: &str, limit: usize) -> Result<Vec<TrackInfo>> {
        let query = format!("tag:\"{}\"", escape_lucene(tag));
        let limit = limit.to_string();
        let response: RecordingSearchResponse = self
            .get_json(
                "/recording",
                &[("query", query.as_str()), ("limit", limit.as_str())],
            )
            .await?;

        Ok(response
            .recordings
            .into_iter()
            .enumerate()
            .map(|(i, r)| to_track(r, (i + 1) as u32))
            .collect())
    }

    async fn artist_info(&self, artist: &str) -> Result<ArtistInfo> {
        let found = self.find_artist(artist).await?;
        let path = format!("/artist/{}", found.id);
        let full: ApiArtist = self.get_json(&path, &[("inc", "tags")]).await?;

        let url = entity_url("artist", &full.id);
        Ok(ArtistInfo {
            external_id: Some(full.id),
            name: full.name,
            listeners: None,
            playcount: None,
            tags: top_tag_names(full.tags, usize::MAX),
            url: Some(url),
        })
    }

    /// Emulated as artists sharing the seed's three strongest tags.
    async fn similar_artists(&self, artist: &str, limit: usize) -> Result<Vec<ArtistInfo>> {
        let seed = self.artist_info(artist).await?;
        let top_tags: Vec<String> = seed.tags.iter().take(3).cloned().collect();
        if top_tags.is_empty() {
            debug!(artist, "seed artist has no tags, nothing to emulate from");
            return Ok(Vec::new());
        }

        let query = top_tags
            .iter()
            .map(|t| format!("tag:\"{}\"", escape_lucene(t)))
            .collect::<Vec<_>>()
            .join(" OR ");
        let fetch = (limit + 1).to_string();
        let response: ArtistSearchResponse = self
            .get_json(
                "/artist",
                &[("query", query.as_str()), ("limit", fetch.as_str())],
            )
            .await?;

        let seed_id = seed.external_id.as_deref().unwrap_or("");
        let mut artists: Vec<ArtistInfo> = response
            .artists
            .into_iter()
            .filter(|a| a.id != seed_id)
            .map(|a| {
                let url = entity_url("artist", &a.id);
                ArtistInfo {
                    external_id: Some(a.id),
                    name: a.name,
                    listeners: None,
                    playcount: None,
                    tags: top_tag_names(a.tags, usize::MAX),
                    url: Some(url),
                }
            })
            .collect();
        artists.truncate(limit);
        Ok(artists)
    }
}

/// Escape characters Lucene would interpret as operators.
fn escape_lucene(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if LUCENE_SPECIALS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn to_track(recording: ApiRecording, rank: u32) -> TrackInfo {
    let url = entity_url("recording", &recording.id);
    TrackInfo {
        external_id: Some(recording.id),
        source: KIND,
        artist: recording
            .artist_credit
            .into_iter()
            .next()
            .map(|c| c.name)
            .unwrap_or_default(),
        title: recording.title,
        album: recording
            .releases
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|r| r.title),
        rank,
        playcount: None,
        duration: recording.length.map(|ms| (ms / 1000) as u32),
        url: Some(url),
    }
}

/// Tag names strongest-first; `count` is how many users applied the tag.
fn top_tag_names(mut tags: Vec<ApiTag>, n: usize) -> Vec<String> {
    tags.sort_by(|a, b| b.count.unwrap_or(0).cmp(&a.count.unwrap_or(0)));
    tags.into_iter().take(n).map(|t| t.name).collect()
}

fn entity_url(entity: &str, id: &str) -> String {
    format!("https://musicbrainz.org/{}/{}", entity, id)
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<ApiRecording>,
}

#[derive(Debug, Deserialize)]
struct ApiRecording {
    id: String,
    title: String,
    /// Recording length in milliseconds
    #[serde(default)]
    length: Option<u64>,
    #[serde(default, rename = "artist-credit")]
    artist_credit: Vec<ApiArtistCredit>,
    #[serde(default)]
    releases: Option<Vec<ApiRelease>>,
}

/// Display name of one credit; may differ from the artist entity's name.
#[derive(Debug, Deserialize)]
struct ApiArtistCredit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRelease {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    id: String,
    name: String,
    #[serde(default)]
    tags: Vec<ApiTag>,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
    #[serde(default)]
    count: Option<i64>,
}
