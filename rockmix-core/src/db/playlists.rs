//! Playlist persistence
//!
//! A playlist is one `playlists` row plus ordered link rows in
//! `playlist_songs`. `song_count` is maintained in the same transaction as
//! every link mutation so the two can never drift.

use rockmix_common::db::models::{Playlist, Song};
use rockmix_common::{Error, PlaylistType, Result, SourceKind};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const PLAYLIST_COLUMNS: &str = "id, name, description, playlist_type, source, seed_artist, \
     seed_tag, song_count, generated_at, exported_at, exported_path, created_at";

/// Fields for a playlist row about to be created.
#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub name: String,
    pub description: Option<String>,
    pub playlist_type: PlaylistType,
    pub source: SourceKind,
    pub seed_artist: Option<String>,
    pub seed_tag: Option<String>,
}

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    let playlist_type: String = row.get("playlist_type");
    let source: String = row.get("source");
    Ok(Playlist {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        playlist_type: playlist_type.parse()?,
        source: source.parse()?,
        seed_artist: row.get("seed_artist"),
        seed_tag: row.get("seed_tag"),
        song_count: row.get("song_count"),
        generated_at: row.get("generated_at"),
        exported_at: row.get("exported_at"),
        exported_path: row.get("exported_path"),
        created_at: row.get("created_at"),
    })
}

/// Insert a playlist row and return it.
pub async fn create(pool: &SqlitePool, playlist: &NewPlaylist) -> Result<Playlist> {
    let result = sqlx::query(
        r#"
        INSERT INTO playlists (name, description, playlist_type, source, seed_artist, seed_tag, generated_at)
        VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(&playlist.name)
    .bind(&playlist.description)
    .bind(playlist.playlist_type.as_str())
    .bind(playlist.source.as_str())
    .bind(&playlist.seed_artist)
    .bind(&playlist.seed_tag)
    .execute(pool)
    .await?;

    find_by_id(pool, result.last_insert_rowid()).await
}

/// Rename a playlist or change its description.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let result = sqlx::query("UPDATE playlists SET name = ?, description = ? WHERE id = ?")
        .bind(name)
        .bind(description)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::PlaylistNotFound(id));
    }
    Ok(())
}

/// Delete a playlist and its link rows in one transaction.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        // Dropping the transaction rolls back
        return Err(Error::PlaylistNotFound(id));
    }

    tx.commit().await?;
    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Playlist> {
    let sql = format!("SELECT {PLAYLIST_COLUMNS} FROM playlists WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(Error::PlaylistNotFound(id))?;
    playlist_from_row(&row)
}

/// All playlists, newest first.
pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Playlist>> {
    let sql = format!("SELECT {PLAYLIST_COLUMNS} FROM playlists ORDER BY created_at DESC, id DESC");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(playlist_from_row).collect()
}

pub async fn find_by_type(pool: &SqlitePool, playlist_type: PlaylistType) -> Result<Vec<Playlist>> {
    let sql = format!(
        "SELECT {PLAYLIST_COLUMNS} FROM playlists
         WHERE playlist_type = ?
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(playlist_type.as_str())
        .fetch_all(pool)
        .await?;
    rows.iter().map(playlist_from_row).collect()
}

pub async fn find_by_source(pool: &SqlitePool, source: SourceKind) -> Result<Vec<Playlist>> {
    let sql = format!(
        "SELECT {PLAYLIST_COLUMNS} FROM playlists
         WHERE source = ?
         ORDER BY created_at DESC, id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(source.as_str())
        .fetch_all(pool)
        .await?;
    rows.iter().map(playlist_from_row).collect()
}

/// Append songs to a playlist.
///
/// Positions continue after the current maximum; songs already present are
/// skipped. `song_count` is bumped by the number of links actually added, in
/// the same transaction. Returns that number.
pub async fn add_songs(pool: &SqlitePool, playlist_id: i64, song_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM playlists WHERE id = ?)")
        .bind(playlist_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(Error::PlaylistNotFound(playlist_id));
    }

    let max_position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position), 0) FROM playlist_songs WHERE playlist_id = ?",
    )
    .bind(playlist_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut next_position = max_position + 1;
    let mut added = 0u64;
    for song_id in song_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO playlist_songs (playlist_id, song_id, position) VALUES (?, ?, ?)",
        )
        .bind(playlist_id)
        .bind(song_id)
        .bind(next_position)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 1 {
            next_position += 1;
            added += 1;
        }
    }

    sqlx::query("UPDATE playlists SET song_count = song_count + ? WHERE id = ?")
        .bind(added as i64)
        .bind(playlist_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(added)
}

/// Remove songs from a playlist, decrementing `song_count` by the number of
/// links actually deleted. Returns that number.
pub async fn remove_songs(pool: &SqlitePool, playlist_id: i64, song_ids: &[i64]) -> Result<u64> {
    if song_ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    let placeholders = vec!["?"; song_ids.len()].join(", ");
    let sql = format!(
        "DELETE FROM playlist_songs WHERE playlist_id = ? AND song_id IN ({placeholders})"
    );
    let mut query = sqlx::query(&sql).bind(playlist_id);
    for song_id in song_ids {
        query = query.bind(song_id);
    }
    let removed = query.execute(&mut *tx).await?.rows_affected();

    let result = sqlx::query("UPDATE playlists SET song_count = song_count - ? WHERE id = ?")
        .bind(removed as i64)
        .bind(playlist_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::PlaylistNotFound(playlist_id));
    }

    tx.commit().await?;
    Ok(removed)
}

/// Songs of a playlist in play order.
pub async fn songs_for_playlist(pool: &SqlitePool, playlist_id: i64) -> Result<Vec<Song>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.device_id, s.path, s.title, s.artist, s.album_artist, s.album, s.genre,
               s.composer, s.comment, s.year, s.track_number, s.disc_number, s.duration,
               s.bitrate, s.play_count, s.rating, s.file_size, s.lastfm_id, s.spotify_id,
               s.musicbrainz_id, s.matched_source, s.matched_at, s.match_confidence
        FROM playlist_songs ps
        JOIN songs s ON s.id = ps.song_id
        WHERE ps.playlist_id = ?
        ORDER BY ps.position
        "#,
    )
    .bind(playlist_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(super::songs::song_from_row).collect())
}

/// Record where a playlist file landed on the device.
pub async fn mark_exported(pool: &SqlitePool, playlist_id: i64, exported_path: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE playlists SET exported_path = ?, exported_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(exported_path)
    .bind(playlist_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::PlaylistNotFound(playlist_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::songs::{self, NewSong};
    use rockmix_common::db::init_memory_database;

    fn sample() -> NewPlaylist {
        NewPlaylist {
            name: "Top Songs - Queen (Last.fm)".to_string(),
            description: None,
            playlist_type: PlaylistType::TopSongs,
            source: SourceKind::Lastfm,
            seed_artist: Some("Queen".to_string()),
            seed_tag: None,
        }
    }

    async fn seed_songs(pool: &SqlitePool, n: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        for i in 0..n {
            let song = songs::create(
                pool,
                &NewSong {
                    title: Some(format!("T{i}")),
                    ..NewSong::new(format!("/m/{i}.mp3"))
                },
            )
            .await
            .unwrap();
            ids.push(song.id);
        }
        ids
    }

    #[tokio::test]
    async fn create_and_load_round_trips_typed_fields() {
        let pool = init_memory_database().await.unwrap();

        let created = create(&pool, &sample()).await.unwrap();
        assert!(created.id > 0);
        assert_eq!(created.playlist_type, PlaylistType::TopSongs);
        assert_eq!(created.source, SourceKind::Lastfm);
        assert_eq!(created.song_count, 0);
        assert!(created.generated_at.is_some());
        assert!(created.exported_path.is_none());
    }

    #[tokio::test]
    async fn missing_playlist_is_a_typed_error() {
        let pool = init_memory_database().await.unwrap();
        let err = find_by_id(&pool, 42).await.unwrap_err();
        assert!(matches!(err, Error::PlaylistNotFound(42)));
    }

    #[tokio::test]
    async fn add_songs_assigns_contiguous_positions_and_bumps_count() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();
        let ids = seed_songs(&pool, 5).await;

        let added = add_songs(&pool, playlist.id, &ids[..3]).await.unwrap();
        assert_eq!(added, 3);

        // A second batch continues after the current maximum
        let added = add_songs(&pool, playlist.id, &ids[3..]).await.unwrap();
        assert_eq!(added, 2);

        let reloaded = find_by_id(&pool, playlist.id).await.unwrap();
        assert_eq!(reloaded.song_count, 5);

        let ordered = songs_for_playlist(&pool, playlist.id).await.unwrap();
        let titles: Vec<_> = ordered.iter().filter_map(|s| s.title.clone()).collect();
        assert_eq!(titles, vec!["T0", "T1", "T2", "T3", "T4"]);
    }

    #[tokio::test]
    async fn adding_a_duplicate_song_is_skipped() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();
        let ids = seed_songs(&pool, 2).await;

        add_songs(&pool, playlist.id, &ids).await.unwrap();
        let added = add_songs(&pool, playlist.id, &ids[..1]).await.unwrap();
        assert_eq!(added, 0);

        let reloaded = find_by_id(&pool, playlist.id).await.unwrap();
        assert_eq!(reloaded.song_count, 2);
    }

    #[tokio::test]
    async fn remove_songs_decrements_count_by_rows_deleted() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();
        let ids = seed_songs(&pool, 4).await;
        add_songs(&pool, playlist.id, &ids).await.unwrap();

        // One present song, one never added
        let removed = remove_songs(&pool, playlist.id, &[ids[1], 9999]).await.unwrap();
        assert_eq!(removed, 1);

        let reloaded = find_by_id(&pool, playlist.id).await.unwrap();
        assert_eq!(reloaded.song_count, 3);
    }

    #[tokio::test]
    async fn delete_removes_row_and_links() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();
        let ids = seed_songs(&pool, 2).await;
        add_songs(&pool, playlist.id, &ids).await.unwrap();

        delete(&pool, playlist.id).await.unwrap();

        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM playlist_songs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(links, 0);

        let err = delete(&pool, playlist.id).await.unwrap_err();
        assert!(matches!(err, Error::PlaylistNotFound(_)));
    }

    #[tokio::test]
    async fn filters_by_type_and_source() {
        let pool = init_memory_database().await.unwrap();
        create(&pool, &sample()).await.unwrap();
        create(
            &pool,
            &NewPlaylist {
                name: "Tag - rock (Spotify)".to_string(),
                playlist_type: PlaylistType::Tag,
                source: SourceKind::Spotify,
                seed_artist: None,
                seed_tag: Some("rock".to_string()),
                description: None,
            },
        )
        .await
        .unwrap();

        let top = find_by_type(&pool, PlaylistType::TopSongs).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].seed_artist.as_deref(), Some("Queen"));

        let spotify = find_by_source(&pool, SourceKind::Spotify).await.unwrap();
        assert_eq!(spotify.len(), 1);
        assert_eq!(spotify[0].seed_tag.as_deref(), Some("rock"));

        assert_eq!(find_all(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mark_exported_records_path_and_time() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();

        mark_exported(&pool, playlist.id, "/mnt/ipod/Playlists/p.m3u8")
            .await
            .unwrap();

        let reloaded = find_by_id(&pool, playlist.id).await.unwrap();
        assert_eq!(
            reloaded.exported_path.as_deref(),
            Some("/mnt/ipod/Playlists/p.m3u8")
        );
        assert!(reloaded.exported_at.is_some());
    }

    #[tokio::test]
    async fn rename_updates_in_place() {
        let pool = init_memory_database().await.unwrap();
        let playlist = create(&pool, &sample()).await.unwrap();

        update(&pool, playlist.id, "Renamed", Some("great songs"))
            .await
            .unwrap();

        let reloaded = find_by_id(&pool, playlist.id).await.unwrap();
        assert_eq!(reloaded.name, "Renamed");
        assert_eq!(reloaded.description.as_deref(), Some("great songs"));
    }
}
