//! Database initialization
//!
//! Opens (or creates) the catalog database and applies the schema. All
//! `create_*_table` functions are idempotent and safe to call on every
//! startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection pool and create tables if needed.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys (playlist_songs cascades depend on this)
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    // WAL allows readers to keep polling while a parse run writes batches
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Initialize an in-memory database with the full schema.
///
/// Used by tests. The pool is capped at a single connection because each
/// new `sqlite::memory:` connection would otherwise see its own empty
/// database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_songs_table(pool).await?;
    create_playlists_table(pool).await?;
    create_playlist_songs_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the songs table
///
/// One row per track found on the device. `device_id` is the MD5 hex digest
/// of the device-relative path and survives re-parses, so external IDs and
/// match provenance attached to it are stable across catalog rebuilds.
pub async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL UNIQUE,
            path TEXT NOT NULL UNIQUE,
            title TEXT,
            artist TEXT,
            album_artist TEXT,
            album TEXT,
            genre TEXT,
            composer TEXT,
            comment TEXT,
            year INTEGER,
            track_number INTEGER,
            disc_number INTEGER,
            duration INTEGER,
            bitrate INTEGER,
            play_count INTEGER,
            rating INTEGER,
            file_size INTEGER,
            lastfm_id TEXT,
            spotify_id TEXT,
            musicbrainz_id TEXT,
            matched_source TEXT,
            matched_at TIMESTAMP,
            match_confidence REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (length(path) > 0),
            CHECK (duration IS NULL OR duration >= 0),
            CHECK (match_confidence IS NULL OR (match_confidence >= 0.0 AND match_confidence <= 1.0))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Matching looks songs up by artist or album artist; browsing by genre
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_artist ON songs(artist)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_album_artist ON songs(album_artist)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_genre ON songs(genre)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_title ON songs(title)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the playlists table
pub async fn create_playlists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            playlist_type TEXT NOT NULL CHECK (playlist_type IN ('top_songs', 'mixed', 'similar', 'tag')),
            source TEXT NOT NULL CHECK (source IN ('lastfm', 'spotify', 'musicbrainz')),
            seed_artist TEXT,
            seed_tag TEXT,
            song_count INTEGER NOT NULL DEFAULT 0,
            generated_at TIMESTAMP,
            exported_at TIMESTAMP,
            exported_path TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (song_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_playlists_created ON playlists(created_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_playlists_type ON playlists(playlist_type)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the playlist_songs linking table
///
/// Positions are 1-based and unique within a playlist.
pub async fn create_playlist_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_songs (
            playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
            song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (playlist_id, song_id),
            UNIQUE (playlist_id, position),
            CHECK (position > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlist_songs_order ON playlist_songs(playlist_id, position)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_playlist_songs_song ON playlist_songs(song_id)")
        .execute(pool)
        .await?;

    Ok(())
}
