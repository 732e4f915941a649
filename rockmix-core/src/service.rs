//! Application service
//!
//! `App` is the single entry point a front-end talks to. It owns the
//! database pool, the registry of configured backends, the parse status,
//! and the in-memory log ring. Everything else in the crate is wired
//! together here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rockmix_common::db::{Playlist, Song};
use rockmix_common::{Error, LogBuffer, LogEntry, LogLevel, Result, SourceKind};

use crate::db::{self, playlists, settings, songs};
use crate::matcher::MATCH_THRESHOLD;
use crate::playlist::{generator, GenerateReport, GenerateRequest};
use crate::scanner;
use crate::sources::{
    LastfmClient, MusicSource, MusicbrainzClient, SourceClient, SpotifyClient, TrackInfo,
};
use crate::tagcache;

/// Settings keys that force a registry rebuild when written.
const REGISTRY_URL_KEYS: [&str; 4] = [
    settings::LASTFM_API_URL,
    settings::SPOTIFY_API_URL,
    settings::SPOTIFY_TOKEN_URL,
    settings::MUSICBRAINZ_API_URL,
];

/// Progress of the current (or last) library parse. Returned by copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseStatus {
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total: u32,
    pub processed: u32,
    pub errors: u32,
    pub last_error: Option<String>,
}

/// What one parse run produced.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParseSummary {
    /// Songs now in the catalog
    pub songs: u64,
    /// Songs the previous catalog held before the replace
    pub replaced: u64,
    /// True when the TagCache was unreadable and the filesystem scanner ran
    pub used_fallback: bool,
}

/// Outcome of a library-wide external matching pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MatchLibraryReport {
    pub total: usize,
    pub matched: usize,
    /// Backend found nothing for the song
    pub misses: usize,
    /// A result came back but scored under the confidence threshold
    pub low_confidence: usize,
    /// Search errors that were skipped, and results without a usable id
    pub failed: usize,
}

pub struct App {
    pool: SqlitePool,
    sources: RwLock<HashMap<SourceKind, SourceClient>>,
    parse_status: Arc<Mutex<ParseStatus>>,
    logs: Arc<LogBuffer>,
    device_root: RwLock<Option<PathBuf>>,
}

impl App {
    /// Build the service around an initialized pool, adopting any device
    /// root and enabled backends found in settings.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let app = Self {
            pool,
            sources: RwLock::new(HashMap::new()),
            parse_status: Arc::new(Mutex::new(ParseStatus::default())),
            logs: Arc::new(LogBuffer::default()),
            device_root: RwLock::new(None),
        };

        if let Some(stored) = settings::get::<String>(&app.pool, settings::ROCKBOX_PATH).await? {
            let root = PathBuf::from(&stored);
            if root.is_dir() {
                *app.device_root.write().await = Some(root);
            } else {
                warn!(path = %stored, "stored device root no longer exists");
            }
        }

        app.register_sources().await?;
        Ok(app)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Log to tracing and the ring buffer together.
    fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => debug!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
        self.logs.append(level, message);
    }

    fn lock_status(&self) -> MutexGuard<'_, ParseStatus> {
        self.parse_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // ----- device root -----

    /// Validate and persist the device root.
    ///
    /// The path must exist, be a directory, and carry a Rockbox database
    /// under `.rockbox/`; each failure has its own error so a front-end can
    /// tell the user which step to fix.
    pub async fn set_device_root(&self, path: &str) -> Result<PathBuf> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(Error::RockboxPathNotSet);
        }

        let root = PathBuf::from(trimmed);
        if !root.is_dir() {
            return Err(Error::RockboxPathInvalid(root));
        }

        let index = root.join(tagcache::ROCKBOX_DIR).join(tagcache::MASTER_INDEX);
        if !index.is_file() {
            return Err(Error::RockboxDatabaseNotFound(index));
        }

        settings::set(&self.pool, settings::ROCKBOX_PATH, trimmed).await?;
        *self.device_root.write().await = Some(root.clone());
        self.log(
            LogLevel::Info,
            format!("device root set to {}", root.display()),
        );
        Ok(root)
    }

    pub async fn device_root(&self) -> Result<PathBuf> {
        self.device_root
            .read()
            .await
            .clone()
            .ok_or(Error::RockboxPathNotSet)
    }

    // ----- backend registry -----

    /// Rebuild the registry from settings: enabled backends with working
    /// credentials only.
    pub async fn register_sources(&self) -> Result<()> {
        let mut registry = self.sources.write().await;
        registry.clear();

        for kind in SourceKind::ALL {
            if !settings::get_bool(&self.pool, &kind.enabled_key()).await? {
                continue;
            }

            let key = settings::get::<String>(&self.pool, kind.credential_key())
                .await?
                .unwrap_or_default();
            let secret = match kind.credential_secret_key() {
                Some(slot) => settings::get::<String>(&self.pool, slot).await?,
                None => None,
            };

            let mut client = self.build_client(kind).await?;
            client.set_credentials(&key, secret.as_deref());
            if client.is_configured() {
                debug!(backend = %kind, "backend registered");
                registry.insert(kind, client);
            } else {
                warn!(backend = %kind, "backend enabled but credentials incomplete, skipping");
            }
        }

        info!(count = registry.len(), "source registry rebuilt");
        Ok(())
    }

    /// Construct one backend client, honoring any endpoint override in
    /// settings (proxies, self-hosted MusicBrainz mirrors).
    async fn build_client(&self, kind: SourceKind) -> Result<SourceClient> {
        let override_url =
            |key: &'static str| async move { settings::get::<String>(&self.pool, key).await };

        Ok(match kind {
            SourceKind::Lastfm => {
                let mut client = LastfmClient::new();
                if let Some(url) = override_url(settings::LASTFM_API_URL).await? {
                    client = client.with_base_url(url);
                }
                SourceClient::Lastfm(client)
            }
            SourceKind::Spotify => {
                let mut client = SpotifyClient::new();
                if let Some(url) = override_url(settings::SPOTIFY_API_URL).await? {
                    client = client.with_api_url(url);
                }
                if let Some(url) = override_url(settings::SPOTIFY_TOKEN_URL).await? {
                    client = client.with_token_url(url);
                }
                SourceClient::Spotify(client)
            }
            SourceKind::Musicbrainz => {
                let mut client = MusicbrainzClient::new();
                if let Some(url) = override_url(settings::MUSICBRAINZ_API_URL).await? {
                    client = client.with_base_url(url);
                }
                SourceClient::Musicbrainz(client)
            }
        })
    }

    /// Persist credentials for a backend, enable it, and re-register.
    pub async fn set_source_credentials(
        &self,
        kind: SourceKind,
        key: &str,
        secret: Option<&str>,
    ) -> Result<()> {
        settings::set(&self.pool, kind.credential_key(), key).await?;
        if let (Some(slot), Some(secret)) = (kind.credential_secret_key(), secret) {
            settings::set(&self.pool, slot, secret).await?;
        }
        settings::set(&self.pool, &kind.enabled_key(), true).await?;
        self.register_sources().await?;
        self.log(
            LogLevel::Info,
            format!("{} credentials updated", kind.display_name()),
        );
        Ok(())
    }

    async fn client(&self, kind: SourceKind) -> Result<SourceClient> {
        self.sources
            .read()
            .await
            .get(&kind)
            .cloned()
            .ok_or(Error::ApiKeyMissing { backend: kind })
    }

    // ----- library parse -----

    /// Parse the device library into the catalog.
    ///
    /// Reads the Rockbox TagCache, falling back to a filesystem scan when
    /// the database is unreadable, then replaces the catalog wholesale.
    /// Only one parse runs at a time; the status is finalized no matter how
    /// the run ends.
    pub async fn parse(&self, cancel: CancellationToken) -> Result<ParseSummary> {
        let root = self.device_root().await?;

        {
            let mut status = self.lock_status();
            if status.in_progress {
                return Err(Error::ParseInProgress);
            }
            *status = ParseStatus {
                in_progress: true,
                started_at: Some(Utc::now()),
                ..ParseStatus::default()
            };
        }

        let run_id = Uuid::new_v4();
        self.log(LogLevel::Info, format!("library parse {} started", run_id));

        let result = self.run_parse(&root, &cancel).await;

        {
            let mut status = self.lock_status();
            status.in_progress = false;
            status.completed_at = Some(Utc::now());
            if let Err(e) = &result {
                status.errors += 1;
                status.last_error = Some(e.to_string());
            }
        }

        match &result {
            Ok(summary) => self.log(
                LogLevel::Info,
                format!(
                    "library parse {} finished: {} songs{}",
                    run_id,
                    summary.songs,
                    if summary.used_fallback {
                        " (filesystem scan)"
                    } else {
                        ""
                    }
                ),
            ),
            Err(e) => self.log(
                LogLevel::Error,
                format!("library parse {} failed: {}", run_id, e),
            ),
        }

        result
    }

    async fn run_parse(&self, root: &Path, cancel: &CancellationToken) -> Result<ParseSummary> {
        let rockbox_dir = root.join(tagcache::ROCKBOX_DIR);
        let status = Arc::clone(&self.parse_status);
        let token = cancel.clone();

        let read = tokio::task::spawn_blocking(move || {
            tagcache::read_tagcache(&rockbox_dir, &token, |processed| {
                let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
                status.processed = processed;
            })
        })
        .await
        .map_err(|e| Error::Internal(format!("parse task panicked: {}", e)))?;

        let (tracks, used_fallback) = match read {
            Ok(index) => {
                self.log(
                    LogLevel::Info,
                    format!(
                        "tagcache read: {} tracks, {} deleted, {} without filename",
                        index.tracks.len(),
                        index.stats.deleted,
                        index.stats.missing_filename
                    ),
                );
                (index.tracks, false)
            }
            Err(Error::InvalidTagCache(reason)) => {
                self.log(
                    LogLevel::Warn,
                    format!("tagcache unreadable ({}), scanning filesystem", reason),
                );
                let token = cancel.clone();
                let scan_root = root.to_path_buf();
                let outcome =
                    tokio::task::spawn_blocking(move || scanner::scan_device(&scan_root, &token))
                        .await
                        .map_err(|e| Error::Internal(format!("scan task panicked: {}", e)))??;
                self.log(
                    LogLevel::Info,
                    format!(
                        "filesystem scan: {} tracks, {} non-audio files skipped",
                        outcome.tracks.len(),
                        outcome.skipped
                    ),
                );
                (outcome.tracks, true)
            }
            Err(e) => return Err(e),
        };

        if cancel.is_cancelled() {
            return Err(Error::OperationCancelled);
        }

        let replaced = songs::delete_all(&self.pool).await?;
        let inserted = songs::create_batch(&self.pool, &tracks).await?;
        settings::set_last_parsed_at(&self.pool, Utc::now()).await?;

        {
            let mut status = self.lock_status();
            status.total = tracks.len() as u32;
            status.processed = tracks.len() as u32;
        }

        Ok(ParseSummary {
            songs: inserted,
            replaced,
            used_fallback,
        })
    }

    pub fn parse_status(&self) -> ParseStatus {
        self.lock_status().clone()
    }

    pub async fn last_parsed_at(&self) -> Result<Option<DateTime<Utc>>> {
        settings::last_parsed_at(&self.pool).await
    }

    // ----- playlist generation -----

    /// Fetch, match, persist and export a playlist.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerateReport> {
        let root = self.device_root().await?;
        let client = self.client(request.source).await?;

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Error::OperationCancelled),
            result = generator::generate(&self.pool, &client, &root, request) => result,
        };

        match &result {
            Ok(report) => self.log(
                LogLevel::Info,
                format!(
                    "generated '{}' with {} of {} tracks matched",
                    report.playlist.name, report.matched, report.fetched
                ),
            ),
            Err(e) => self.log(LogLevel::Error, format!("generate failed: {}", e)),
        }
        result
    }

    /// Fetch candidate tracks only, for a front-end preview.
    pub async fn fetch_tracks(
        &self,
        request: &GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<TrackInfo>> {
        let client = self.client(request.source).await?;
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::OperationCancelled),
            result = generator::fetch_tracks(&client, request) => result,
        }
    }

    /// Assemble and export a playlist from tracks fetched earlier.
    pub async fn generate_from_tracks(
        &self,
        request: &GenerateRequest,
        tracks: &[TrackInfo],
    ) -> Result<GenerateReport> {
        let root = self.device_root().await?;
        generator::generate_from_tracks(&self.pool, &root, request, tracks).await
    }

    // ----- external matching -----

    /// Search one backend for every catalog song that has no external id
    /// from it yet, storing id and provenance for confident matches.
    ///
    /// Credential and rate-limit errors abort the pass; per-song misses and
    /// transient failures are counted and skipped.
    pub async fn match_library(
        &self,
        kind: SourceKind,
        cancel: &CancellationToken,
    ) -> Result<MatchLibraryReport> {
        let client = self.client(kind).await?;
        let unmatched = songs::find_unmatched(&self.pool, kind).await?;

        let mut report = MatchLibraryReport {
            total: unmatched.len(),
            ..MatchLibraryReport::default()
        };
        self.log(
            LogLevel::Info,
            format!(
                "matching {} songs against {}",
                report.total,
                kind.display_name()
            ),
        );

        for song in unmatched {
            if cancel.is_cancelled() {
                return Err(Error::OperationCancelled);
            }

            let artist = song.effective_artist().to_string();
            let title = song.title.clone().unwrap_or_default();
            if artist.is_empty() && title.is_empty() {
                report.failed += 1;
                continue;
            }

            match client.search_track(&artist, &title).await {
                Ok(found) if found.confidence >= MATCH_THRESHOLD => {
                    match found.track.external_id.as_deref() {
                        Some(id) => {
                            songs::set_external_id(&self.pool, song.id, kind, id, found.confidence)
                                .await?;
                            report.matched += 1;
                        }
                        None => {
                            debug!(song = %song.display_label(), "match carries no external id");
                            report.failed += 1;
                        }
                    }
                }
                Ok(found) => {
                    debug!(
                        song = %song.display_label(),
                        confidence = found.confidence,
                        "match below threshold"
                    );
                    report.low_confidence += 1;
                }
                Err(Error::NoMatchFound { .. }) => report.misses += 1,
                Err(
                    e @ (Error::ApiRateLimited { .. }
                    | Error::ApiUnauthorized { .. }
                    | Error::ApiKeyMissing { .. }),
                ) => {
                    self.log(LogLevel::Error, format!("matching aborted: {}", e));
                    return Err(e);
                }
                Err(e) => {
                    debug!(song = %song.display_label(), error = %e, "search failed, skipping");
                    report.failed += 1;
                }
            }
        }

        self.log(
            LogLevel::Info,
            format!(
                "matching done: {}/{} linked to {}",
                report.matched,
                report.total,
                kind.display_name()
            ),
        );
        Ok(report)
    }

    // ----- playlists -----

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        playlists::find_all(&self.pool).await
    }

    pub async fn playlist_songs(&self, playlist_id: i64) -> Result<Vec<Song>> {
        playlists::songs_for_playlist(&self.pool, playlist_id).await
    }

    /// Delete a playlist and, when it was exported, the file on the device.
    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<()> {
        let playlist = playlists::find_by_id(&self.pool, playlist_id).await?;
        playlists::delete(&self.pool, playlist_id).await?;

        if let Some(path) = playlist.exported_path.as_deref() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path, "removed exported playlist file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path, error = %e, "could not remove exported playlist file"),
            }
        }

        self.log(
            LogLevel::Info,
            format!("deleted playlist '{}'", playlist.name),
        );
        Ok(())
    }

    // ----- catalog browsing -----

    pub async fn song_count(&self) -> Result<i64> {
        songs::count(&self.pool).await
    }

    pub async fn artists(&self) -> Result<Vec<String>> {
        songs::distinct_album_artists(&self.pool).await
    }

    pub async fn genres(&self) -> Result<Vec<String>> {
        songs::distinct_genres(&self.pool).await
    }

    /// Purge songs and playlists; settings survive.
    pub async fn wipe(&self) -> Result<(u64, u64)> {
        let (songs, playlists) = db::wipe(&self.pool).await?;
        *self.lock_status() = ParseStatus::default();
        self.log(
            LogLevel::Info,
            format!("catalog wiped: {} songs, {} playlists", songs, playlists),
        );
        Ok((songs, playlists))
    }

    // ----- logs and configuration -----

    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.entries()
    }

    pub fn clear_logs(&self) {
        self.logs.clear();
    }

    pub async fn config_get(&self, key: &str) -> Result<String> {
        settings::get_required(&self.pool, key).await
    }

    pub async fn config_all(&self) -> Result<HashMap<String, String>> {
        settings::get_all(&self.pool).await
    }

    /// Set one configuration key. Keys that affect the backend registry
    /// trigger a re-register.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        settings::set(&self.pool, key, value).await?;

        let touches_registry = REGISTRY_URL_KEYS.contains(&key)
            || SourceKind::ALL.iter().any(|k| {
                k.enabled_key() == key
                    || k.credential_key() == key
                    || k.credential_secret_key() == Some(key)
            });
        if touches_registry {
            self.register_sources().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::playlists::NewPlaylist;
    use rockmix_common::db::init_memory_database;
    use rockmix_common::PlaylistType;
    use std::fs;

    async fn test_app() -> App {
        let pool = init_memory_database().await.unwrap();
        App::new(pool).await.unwrap()
    }

    /// Device root with a `.rockbox` marker whose database is garbage, so
    /// parses exercise the filesystem fallback.
    fn fake_device(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let rockbox = dir.path().join(".rockbox");
        fs::create_dir_all(&rockbox).unwrap();
        fs::write(rockbox.join("database_idx.tcd"), b"not a tagcache").unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn device_root_validation_steps() {
        let app = test_app().await;

        assert!(matches!(
            app.set_device_root("  ").await,
            Err(Error::RockboxPathNotSet)
        ));
        assert!(matches!(
            app.set_device_root("/definitely/not/here").await,
            Err(Error::RockboxPathInvalid(_))
        ));

        let bare = tempfile::tempdir().unwrap();
        assert!(matches!(
            app.set_device_root(&bare.path().to_string_lossy()).await,
            Err(Error::RockboxDatabaseNotFound(_))
        ));

        let device = fake_device(&[]);
        let root = app
            .set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();
        assert_eq!(root, device.path());
        assert_eq!(
            app.config_get(settings::ROCKBOX_PATH).await.unwrap(),
            device.path().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn parse_falls_back_to_filesystem_scan() {
        let app = test_app().await;
        let device = fake_device(&[
            "Music/Queen - One Vision.mp3",
            "Music/liner-notes.txt",
            "Podcasts/episode.ogg",
        ]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();

        let summary = app.parse(CancellationToken::new()).await.unwrap();
        assert!(summary.used_fallback);
        assert_eq!(summary.songs, 2);
        assert_eq!(app.song_count().await.unwrap(), 2);
        assert!(app.last_parsed_at().await.unwrap().is_some());

        let status = app.parse_status();
        assert!(!status.in_progress);
        assert_eq!(status.errors, 0);
        assert_eq!(status.total, 2);
        assert!(status.completed_at.is_some());
    }

    #[tokio::test]
    async fn second_parse_replaces_the_catalog() {
        let app = test_app().await;
        let device = fake_device(&["a.mp3", "b.mp3"]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();

        app.parse(CancellationToken::new()).await.unwrap();
        fs::remove_file(device.path().join("b.mp3")).unwrap();
        let summary = app.parse(CancellationToken::new()).await.unwrap();

        assert_eq!(summary.replaced, 2);
        assert_eq!(summary.songs, 1);
        assert_eq!(app.song_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_parse_is_rejected() {
        let app = test_app().await;
        let device = fake_device(&[]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();

        app.lock_status().in_progress = true;
        assert!(matches!(
            app.parse(CancellationToken::new()).await,
            Err(Error::ParseInProgress)
        ));
        // the rejected call must not have finalized the running status
        assert!(app.parse_status().in_progress);
    }

    #[tokio::test]
    async fn cancelled_parse_finalizes_status() {
        let app = test_app().await;
        let device = fake_device(&["a.mp3"]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            app.parse(cancel).await,
            Err(Error::OperationCancelled)
        ));

        let status = app.parse_status();
        assert!(!status.in_progress);
        assert_eq!(status.errors, 1);
        assert!(status.last_error.is_some());
        assert_eq!(app.song_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn config_changes_rebuild_the_registry() {
        let app = test_app().await;

        assert!(matches!(
            app.client(SourceKind::Lastfm).await,
            Err(Error::ApiKeyMissing { .. })
        ));

        app.config_set("lastfm_api_key", "abc123").await.unwrap();
        app.config_set("lastfm_enabled", "true").await.unwrap();
        assert!(app.client(SourceKind::Lastfm).await.is_ok());

        app.config_set("lastfm_enabled", "false").await.unwrap();
        assert!(matches!(
            app.client(SourceKind::Lastfm).await,
            Err(Error::ApiKeyMissing { .. })
        ));
    }

    #[tokio::test]
    async fn set_source_credentials_enables_and_registers() {
        let app = test_app().await;
        app.set_source_credentials(SourceKind::Spotify, "id", Some("secret"))
            .await
            .unwrap();

        assert!(app.client(SourceKind::Spotify).await.is_ok());
        assert_eq!(app.config_get("spotify_client_id").await.unwrap(), "id");
        assert_eq!(
            app.config_get("spotify_client_secret").await.unwrap(),
            "secret"
        );
        assert_eq!(app.config_get("spotify_enabled").await.unwrap(), "true");
    }

    #[tokio::test]
    async fn delete_playlist_removes_exported_file() {
        let app = test_app().await;
        let device = fake_device(&[]);

        let playlist = playlists::create(
            app.pool(),
            &NewPlaylist {
                name: "doomed".to_string(),
                description: None,
                playlist_type: PlaylistType::TopSongs,
                source: SourceKind::Lastfm,
                seed_artist: Some("x".to_string()),
                seed_tag: None,
            },
        )
        .await
        .unwrap();

        let exported = device.path().join("doomed.m3u8");
        fs::write(&exported, "#EXTM3U\n").unwrap();
        playlists::mark_exported(app.pool(), playlist.id, &exported.to_string_lossy())
            .await
            .unwrap();

        app.delete_playlist(playlist.id).await.unwrap();
        assert!(!exported.exists());
        assert!(matches!(
            playlists::find_by_id(app.pool(), playlist.id).await,
            Err(Error::PlaylistNotFound(_))
        ));
    }

    #[tokio::test]
    async fn wipe_clears_catalog_and_status() {
        let app = test_app().await;
        let device = fake_device(&["a.mp3"]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();
        app.parse(CancellationToken::new()).await.unwrap();
        assert_eq!(app.song_count().await.unwrap(), 1);

        let (songs, playlists) = app.wipe().await.unwrap();
        assert_eq!(songs, 1);
        assert_eq!(playlists, 0);
        assert_eq!(app.song_count().await.unwrap(), 0);
        assert_eq!(app.parse_status().total, 0);
        // the device root setting survives a wipe
        assert!(app.config_get(settings::ROCKBOX_PATH).await.is_ok());
    }

    #[tokio::test]
    async fn generate_without_device_root_fails_first() {
        let app = test_app().await;
        let request = GenerateRequest {
            playlist_type: PlaylistType::TopSongs,
            source: SourceKind::Lastfm,
            artist: Some("Queen".to_string()),
            tag: None,
            limit: None,
        };

        assert!(matches!(
            app.generate(&request, &CancellationToken::new()).await,
            Err(Error::RockboxPathNotSet)
        ));
    }

    #[tokio::test]
    async fn logs_accumulate_and_clear() {
        let app = test_app().await;
        let device = fake_device(&[]);
        app.set_device_root(&device.path().to_string_lossy())
            .await
            .unwrap();

        let entries = app.logs();
        assert!(!entries.is_empty());
        assert!(entries
            .iter()
            .any(|e| e.message.contains("device root set")));

        app.clear_logs();
        assert!(app.logs().is_empty());
    }
}
