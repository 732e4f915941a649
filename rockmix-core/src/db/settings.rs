//! Settings access
//!
//! Read/write configuration from the settings table (key-value store).
//! Values are stored as text and parsed on the way out.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rockmix_common::{Error, Result};
use sqlx::SqlitePool;

/// Key holding the mount point of the Rockbox device.
pub const ROCKBOX_PATH: &str = "rockbox_path";

/// Key holding the RFC 3339 timestamp of the last completed parse.
pub const LAST_PARSED_AT: &str = "last_parsed_at";

// Optional backend endpoint overrides, for proxies and self-hosted
// mirrors. Unset means the public service.
pub const LASTFM_API_URL: &str = "lastfm_api_url";
pub const SPOTIFY_API_URL: &str = "spotify_api_url";
pub const SPOTIFY_TOKEN_URL: &str = "spotify_token_url";
pub const MUSICBRAINZ_API_URL: &str = "musicbrainz_api_url";

/// Generic setting getter
///
/// Returns None if the key doesn't exist. Parses the stored text using
/// FromStr.
pub async fn get<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::InvalidInput(format!(
                "setting '{key}' holds unparseable value: {s}"
            ))),
        },
        None => Ok(None),
    }
}

/// Like [`get`], but a missing key is an error.
pub async fn get_required<T: FromStr>(pool: &SqlitePool, key: &str) -> Result<T> {
    get(pool, key)
        .await?
        .ok_or_else(|| Error::ConfigNotFound(key.to_string()))
}

/// Boolean getter; a missing key reads as false.
pub async fn get_bool(pool: &SqlitePool, key: &str) -> Result<bool> {
    Ok(get::<bool>(pool, key).await?.unwrap_or(false))
}

/// Generic setting setter (upsert).
pub async fn set<T: ToString>(pool: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a setting. Missing key is reported as [`Error::ConfigNotFound`].
pub async fn delete(pool: &SqlitePool, key: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ConfigNotFound(key.to_string()));
    }
    Ok(())
}

/// All settings as a key/value map.
pub async fn get_all(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect())
}

/// Timestamp of the last completed parse, if any.
pub async fn last_parsed_at(pool: &SqlitePool) -> Result<Option<DateTime<Utc>>> {
    match get::<String>(pool, LAST_PARSED_AT).await? {
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(&raw).map_err(|e| {
                Error::InvalidInput(format!("stored {LAST_PARSED_AT} is not RFC 3339: {e}"))
            })?;
            Ok(Some(parsed.with_timezone(&Utc)))
        }
        None => Ok(None),
    }
}

/// Record a completed parse.
pub async fn set_last_parsed_at(pool: &SqlitePool, when: DateTime<Utc>) -> Result<()> {
    set(pool, LAST_PARSED_AT, when.to_rfc3339()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockmix_common::db::init_memory_database;

    #[tokio::test]
    async fn get_set_round_trip() {
        let pool = init_memory_database().await.unwrap();

        set(&pool, ROCKBOX_PATH, "/mnt/ipod").await.unwrap();
        let value: Option<String> = get(&pool, ROCKBOX_PATH).await.unwrap();
        assert_eq!(value.as_deref(), Some("/mnt/ipod"));

        // Upsert replaces
        set(&pool, ROCKBOX_PATH, "/media/sansa").await.unwrap();
        let value: Option<String> = get(&pool, ROCKBOX_PATH).await.unwrap();
        assert_eq!(value.as_deref(), Some("/media/sansa"));
    }

    #[tokio::test]
    async fn missing_key_is_none_but_required_errors() {
        let pool = init_memory_database().await.unwrap();

        let value: Option<String> = get(&pool, "nonexistent").await.unwrap();
        assert_eq!(value, None);

        let err = get_required::<String>(&pool, "nonexistent")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "config-not-found");
    }

    #[tokio::test]
    async fn bool_getter_defaults_to_false() {
        let pool = init_memory_database().await.unwrap();

        assert!(!get_bool(&pool, "lastfm_enabled").await.unwrap());

        set(&pool, "lastfm_enabled", true).await.unwrap();
        assert!(get_bool(&pool, "lastfm_enabled").await.unwrap());
    }

    #[tokio::test]
    async fn unparseable_value_is_a_typed_error() {
        let pool = init_memory_database().await.unwrap();
        set(&pool, "some_number", "not-a-number").await.unwrap();

        let err = get::<i64>(&pool, "some_number").await.unwrap_err();
        assert_eq!(err.code(), "invalid-input");
    }

    #[tokio::test]
    async fn delete_missing_key_errors() {
        let pool = init_memory_database().await.unwrap();

        set(&pool, "temp", "1").await.unwrap();
        delete(&pool, "temp").await.unwrap();

        let err = delete(&pool, "temp").await.unwrap_err();
        assert_eq!(err.code(), "config-not-found");
    }

    #[tokio::test]
    async fn last_parsed_at_round_trips_rfc3339() {
        let pool = init_memory_database().await.unwrap();

        assert!(last_parsed_at(&pool).await.unwrap().is_none());

        let now = Utc::now();
        set_last_parsed_at(&pool, now).await.unwrap();
        let loaded = last_parsed_at(&pool).await.unwrap().unwrap();
        assert_eq!(loaded.timestamp(), now.timestamp());
    }

    #[tokio::test]
    async fn get_all_returns_every_key() {
        let pool = init_memory_database().await.unwrap();
        set(&pool, "a", "1").await.unwrap();
        set(&pool, "b", "2").await.unwrap();

        let all = get_all(&pool).await.unwrap();
        assert_eq!(all.get("a").map(String::as_str), Some("1"));
        assert_eq!(all.get("b").map(String::as_str), Some("2"));
    }
}
