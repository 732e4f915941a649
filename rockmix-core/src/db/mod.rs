//! Catalog repositories
//!
//! Async free functions over a `SqlitePool`, one module per table.

pub mod playlists;
pub mod settings;
pub mod songs;

use rockmix_common::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Erase all catalog state in a single transaction: playlist links,
/// playlists, songs, and the last-parse marker. Settings such as the device
/// path and API credentials survive.
///
/// Returns `(songs_removed, playlists_removed)`.
pub async fn wipe(pool: &SqlitePool) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM playlist_songs")
        .execute(&mut *tx)
        .await?;
    let playlists = sqlx::query("DELETE FROM playlists")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let songs = sqlx::query("DELETE FROM songs")
        .execute(&mut *tx)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(settings::LAST_PARSED_AT)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(songs, playlists, "catalog wiped");
    Ok((songs, playlists))
}
