//! Fetch plans and playlist assembly
//!
//! Each playlist type maps to a plan over the backend's capabilities. The
//! fetched tracks are matched against the catalog; only matched songs make
//! it into the persisted playlist, in match order.

use std::collections::HashSet;
use std::path::Path;

use sqlx::SqlitePool;
use tracing::{debug, info};

use rockmix_common::{Error, PlaylistType, Result};

use crate::db::playlists::{self, NewPlaylist};
use crate::matcher;
use crate::playlist::{exporter, GenerateReport, GenerateRequest};
use crate::sources::{MusicSource, TrackInfo};

/// How many similar artists a `similar` playlist draws from.
const SIMILAR_ARTIST_COUNT: usize = 5;

/// Run the fetch plan for the request against one backend.
///
/// The result is deduplicated on (artist, title) and re-ranked in
/// accumulation order.
pub async fn fetch_tracks<S: MusicSource>(
    client: &S,
    request: &GenerateRequest,
) -> Result<Vec<TrackInfo>> {
    request.validate()?;
    let limit = request.effective_limit();

    let mut tracks = match request.playlist_type {
        PlaylistType::TopSongs => client.top_tracks(request.seed(), limit).await?,
        PlaylistType::Mixed => {
            let artist = request.seed();
            let half = limit / 2;
            let mut tracks = client.top_tracks(artist, half).await?;
            // seed the similar half with the artist's biggest hit
            if let Some(seed_title) = tracks.first().map(|t| t.title.clone()) {
                let rest = limit - half;
                let similar = client.similar_tracks(artist, &seed_title, rest).await?;
                tracks.extend(similar);
            }
            tracks
        }
        PlaylistType::Similar => {
            let artists = client
                .similar_artists(request.seed(), SIMILAR_ARTIST_COUNT)
                .await?;
            let per_artist = limit.div_ceil(SIMILAR_ARTIST_COUNT);
            let mut tracks: Vec<TrackInfo> = Vec::new();
            for artist in artists {
                if tracks.len() >= limit {
                    break;
                }
                // one bad similar artist must not sink the whole request
                match client.top_tracks(&artist.name, per_artist).await {
                    Ok(batch) => tracks.extend(batch),
                    Err(e) => {
                        debug!(artist = %artist.name, error = %e, "skipping similar artist")
                    }
                }
            }
            tracks.truncate(limit);
            tracks
        }
        PlaylistType::Tag => client.tag_tracks(request.seed(), limit).await?,
    };

    tracks = dedupe_tracks(tracks);
    for (i, track) in tracks.iter_mut().enumerate() {
        track.rank = (i + 1) as u32;
    }
    Ok(tracks)
}

/// Fetch, match, persist and export in one go.
pub async fn generate<S: MusicSource>(
    pool: &SqlitePool,
    client: &S,
    device_root: &Path,
    request: &GenerateRequest,
) -> Result<GenerateReport> {
    let tracks = fetch_tracks(client, request).await?;
    if tracks.is_empty() {
        return Err(Error::NoMatchingSongs);
    }
    assemble(pool, device_root, request, &tracks).await
}

/// Assemble a playlist from tracks fetched earlier (the preview flow:
/// fetch once, let the user look, then commit).
pub async fn generate_from_tracks(
    pool: &SqlitePool,
    device_root: &Path,
    request: &GenerateRequest,
    tracks: &[TrackInfo],
) -> Result<GenerateReport> {
    if tracks.is_empty() {
        return Err(Error::NoPreFetchedData);
    }
    request.validate()?;
    assemble(pool, device_root, request, tracks).await
}

async fn assemble(
    pool: &SqlitePool,
    device_root: &Path,
    request: &GenerateRequest,
    tracks: &[TrackInfo],
) -> Result<GenerateReport> {
    let outcome = matcher::match_tracks(pool, tracks).await?;
    if outcome.matches.is_empty() {
        return Err(Error::NoMatchingSongs);
    }

    let playlist = playlists::create(
        pool,
        &NewPlaylist {
            name: request.playlist_name(),
            description: Some(format!(
                "{} tracks matched from {}",
                outcome.stats.matched,
                request.source.display_name()
            )),
            playlist_type: request.playlist_type,
            source: request.source,
            seed_artist: request.artist.clone(),
            seed_tag: request.tag.clone(),
        },
    )
    .await?;

    let song_ids: Vec<i64> = outcome.matches.iter().map(|m| m.song.id).collect();
    playlists::add_songs(pool, playlist.id, &song_ids).await?;

    let exported = exporter::export_playlist(pool, device_root, playlist.id).await?;
    let playlist = playlists::find_by_id(pool, playlist.id).await?;

    info!(
        playlist = %playlist.name,
        matched = outcome.stats.matched,
        unmatched = outcome.stats.unmatched,
        "playlist generated"
    );

    Ok(GenerateReport {
        requested: request.effective_limit(),
        fetched: tracks.len(),
        matched: outcome.stats.matched,
        unmatched: outcome.stats.unmatched,
        match_rate: outcome.stats.match_rate(),
        exported_path: exported.to_string_lossy().into_owned(),
        playlist,
    })
}

/// Drop repeated (artist, title) pairs, case-insensitively, keeping the
/// first occurrence. Mixed plans overlap when a top track is also similar
/// to the seed hit.
fn dedupe_tracks(tracks: Vec<TrackInfo>) -> Vec<TrackInfo> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    tracks
        .into_iter()
        .filter(|t| seen.insert((t.artist.to_lowercase(), t.title.to_lowercase())))
        .collect()
}
