//! Song catalog operations
//!
//! One row per track on the device. A full re-parse replaces the catalog
//! wholesale (`delete_all` + `create_batch`), so inserts are written to
//! tolerate duplicate paths inside a batch.

use md5::{Digest, Md5};
use rockmix_common::db::models::Song;
use rockmix_common::{Error, Result, SourceKind};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Batch inserts are chunked so a large catalog never exceeds the SQLite
/// bind-parameter limit.
const BATCH_CHUNK: usize = 100;

const SONG_COLUMNS: &str = "id, device_id, path, title, artist, album_artist, album, genre, \
     composer, comment, year, track_number, disc_number, duration, bitrate, play_count, \
     rating, file_size, lastfm_id, spotify_id, musicbrainz_id, matched_source, matched_at, \
     match_confidence";

/// Track metadata as read from the device, before it has a catalog row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSong {
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
    pub duration: Option<i64>,
    pub bitrate: Option<i64>,
    pub play_count: Option<i64>,
    pub rating: Option<i64>,
    pub file_size: Option<i64>,
}

impl NewSong {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Stable catalog identity: MD5 hex digest of the device-relative path.
    pub fn device_id(&self) -> String {
        let mut hasher = Md5::new();
        hasher.update(self.path.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub(crate) fn song_from_row(row: &SqliteRow) -> Song {
    Song {
        id: row.get("id"),
        device_id: row.get("device_id"),
        path: row.get("path"),
        title: row.get("title"),
        artist: row.get("artist"),
        album_artist: row.get("album_artist"),
        album: row.get("album"),
        genre: row.get("genre"),
        composer: row.get("composer"),
        comment: row.get("comment"),
        year: row.get("year"),
        track_number: row.get("track_number"),
        disc_number: row.get("disc_number"),
        duration: row.get("duration"),
        bitrate: row.get("bitrate"),
        play_count: row.get("play_count"),
        rating: row.get("rating"),
        file_size: row.get("file_size"),
        lastfm_id: row.get("lastfm_id"),
        spotify_id: row.get("spotify_id"),
        musicbrainz_id: row.get("musicbrainz_id"),
        matched_source: row.get("matched_source"),
        matched_at: row.get("matched_at"),
        match_confidence: row.get("match_confidence"),
    }
}

/// Insert a single song and return the stored row.
pub async fn create(pool: &SqlitePool, song: &NewSong) -> Result<Song> {
    let result = sqlx::query(
        r#"
        INSERT INTO songs (
            device_id, path, title, artist, album_artist, album, genre, composer, comment,
            year, track_number, disc_number, duration, bitrate, play_count, rating, file_size
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(song.device_id())
    .bind(&song.path)
    .bind(&song.title)
    .bind(&song.artist)
    .bind(&song.album_artist)
    .bind(&song.album)
    .bind(&song.genre)
    .bind(&song.composer)
    .bind(&song.comment)
    .bind(song.year)
    .bind(song.track_number)
    .bind(song.disc_number)
    .bind(song.duration)
    .bind(song.bitrate)
    .bind(song.play_count)
    .bind(song.rating)
    .bind(song.file_size)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| Error::SongNotFound(song.path.clone()))
}

/// Insert songs in chunks, skipping rows whose path is already present.
///
/// Returns the number of rows actually inserted.
pub async fn create_batch(pool: &SqlitePool, songs: &[NewSong]) -> Result<u64> {
    let mut inserted = 0u64;

    for chunk in songs.chunks(BATCH_CHUNK) {
        let placeholders = std::iter::repeat("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)")
            .take(chunk.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO songs (
                device_id, path, title, artist, album_artist, album, genre, composer, comment,
                year, track_number, disc_number, duration, bitrate, play_count, rating, file_size
            ) VALUES {placeholders}"
        );

        let mut query = sqlx::query(&sql);
        for song in chunk {
            query = query
                .bind(song.device_id())
                .bind(&song.path)
                .bind(&song.title)
                .bind(&song.artist)
                .bind(&song.album_artist)
                .bind(&song.album)
                .bind(&song.genre)
                .bind(&song.composer)
                .bind(&song.comment)
                .bind(song.year)
                .bind(song.track_number)
                .bind(song.disc_number)
                .bind(song.duration)
                .bind(song.bitrate)
                .bind(song.play_count)
                .bind(song.rating)
                .bind(song.file_size);
        }

        inserted += query.execute(pool).await?.rows_affected();
    }

    Ok(inserted)
}

/// Update the mutable metadata of an existing song.
pub async fn update(pool: &SqlitePool, song: &Song) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE songs SET
            title = ?, artist = ?, album_artist = ?, album = ?, genre = ?, composer = ?,
            comment = ?, year = ?, track_number = ?, disc_number = ?, duration = ?,
            bitrate = ?, play_count = ?, rating = ?, file_size = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&song.title)
    .bind(&song.artist)
    .bind(&song.album_artist)
    .bind(&song.album)
    .bind(&song.genre)
    .bind(&song.composer)
    .bind(&song.comment)
    .bind(song.year)
    .bind(song.track_number)
    .bind(song.disc_number)
    .bind(song.duration)
    .bind(song.bitrate)
    .bind(song.play_count)
    .bind(song.rating)
    .bind(song.file_size)
    .bind(song.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::SongNotFound(song.id.to_string()));
    }
    Ok(())
}

/// Delete one song by id.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::SongNotFound(id.to_string()));
    }
    Ok(())
}

/// Empty the catalog. Returns the number of rows removed.
pub async fn delete_all(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM songs").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Song>> {
    let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    Ok(row.as_ref().map(song_from_row))
}

pub async fn find_by_device_id(pool: &SqlitePool, device_id: &str) -> Result<Option<Song>> {
    let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE device_id = ?");
    let row = sqlx::query(&sql)
        .bind(device_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(song_from_row))
}

pub async fn find_by_path(pool: &SqlitePool, path: &str) -> Result<Option<Song>> {
    let sql = format!("SELECT {SONG_COLUMNS} FROM songs WHERE path = ?");
    let row = sqlx::query(&sql).bind(path).fetch_optional(pool).await?;
    Ok(row.as_ref().map(song_from_row))
}

/// Songs whose artist or album artist equals `artist`, case-insensitively.
///
/// Case folding matters here: device tags and backend responses frequently
/// disagree on capitalization for the same artist.
pub async fn find_by_artist(pool: &SqlitePool, artist: &str) -> Result<Vec<Song>> {
    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM songs
         WHERE artist = ? COLLATE NOCASE OR album_artist = ? COLLATE NOCASE
         ORDER BY album, track_number, title"
    );
    let rows = sqlx::query(&sql)
        .bind(artist)
        .bind(artist)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(song_from_row).collect())
}

pub async fn find_by_album_artist(pool: &SqlitePool, album_artist: &str) -> Result<Vec<Song>> {
    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM songs
         WHERE album_artist = ? COLLATE NOCASE
         ORDER BY album, track_number, title"
    );
    let rows = sqlx::query(&sql)
        .bind(album_artist)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(song_from_row).collect())
}

/// Songs whose genre contains `genre` as a substring, case-insensitively.
pub async fn find_by_genre(pool: &SqlitePool, genre: &str) -> Result<Vec<Song>> {
    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM songs
         WHERE genre LIKE ? ESCAPE '\\'
         ORDER BY artist, album, track_number"
    );
    let escaped = genre.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    let rows = sqlx::query(&sql)
        .bind(format!("%{escaped}%"))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(song_from_row).collect())
}

/// Songs without an external ID for the given backend.
pub async fn find_unmatched(pool: &SqlitePool, source: SourceKind) -> Result<Vec<Song>> {
    let column = external_id_column(source);
    let sql = format!(
        "SELECT {SONG_COLUMNS} FROM songs
         WHERE {column} IS NULL OR {column} = ''
         ORDER BY artist, title"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows.iter().map(song_from_row).collect())
}

pub async fn distinct_album_artists(pool: &SqlitePool) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT album_artist FROM songs
         WHERE album_artist IS NOT NULL AND album_artist != ''
         ORDER BY album_artist",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

pub async fn distinct_genres(pool: &SqlitePool) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT genre FROM songs
         WHERE genre IS NOT NULL AND genre != ''
         ORDER BY genre",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Record the external ID a backend resolved for a song, together with the
/// match provenance.
pub async fn set_external_id(
    pool: &SqlitePool,
    song_id: i64,
    source: SourceKind,
    external_id: &str,
    confidence: f64,
) -> Result<()> {
    let column = external_id_column(source);
    let sql = format!(
        "UPDATE songs SET
            {column} = ?,
            matched_source = ?,
            matched_at = CURRENT_TIMESTAMP,
            match_confidence = ?,
            updated_at = CURRENT_TIMESTAMP
         WHERE id = ?"
    );
    let result = sqlx::query(&sql)
        .bind(external_id)
        .bind(source.as_str())
        .bind(confidence)
        .bind(song_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::SongNotFound(song_id.to_string()));
    }
    Ok(())
}

fn external_id_column(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Lastfm => "lastfm_id",
        SourceKind::Spotify => "spotify_id",
        SourceKind::Musicbrainz => "musicbrainz_id",
    }
}
