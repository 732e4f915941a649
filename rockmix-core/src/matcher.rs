//! Fuzzy matching of backend tracks against the local catalog
//!
//! Backends return canonical spellings ("Metallica") while device tags hold
//! whatever the ripper wrote ("METALLICA", "Master Of Puppets (Remastered)").
//! Matching is fuzzy on artist and title, weighted toward the title.

use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::debug;

use rockmix_common::db::Song;
use rockmix_common::Result;

use crate::db::songs;
use crate::sources::TrackInfo;

/// Minimum combined score for a track/song pair to count as a match.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Title suffixes that carry no identity. Checked against folded text.
const NOISE_SUFFIXES: [&str; 6] = [
    "(remastered)",
    "(remaster)",
    "[remastered]",
    "- remastered",
    "(live)",
    "[live]",
];

/// A backend track paired with the catalog song it resolved to.
#[derive(Debug, Clone)]
pub struct MatchedTrack {
    pub track: TrackInfo,
    pub song: Song,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MatchStats {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
}

impl MatchStats {
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matches: Vec<MatchedTrack>,
    pub stats: MatchStats,
}

/// Similarity of two names in [0,1].
///
/// Case-folded; equal strings score 1.0 and an empty side scores 0.0.
/// Noise suffixes are stripped before comparing, containment scores the
/// char-length ratio, anything else falls back to normalized Levenshtein.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a = strip_noise(&a);
    let b = strip_noise(&b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    if a.contains(&b) || b.contains(&a) {
        let a_len = a.chars().count();
        let b_len = b.chars().count();
        return a_len.min(b_len) as f64 / a_len.max(b_len) as f64;
    }

    strsim::normalized_levenshtein(&a, &b)
}

/// Combined score for one track/song pair: 60% title, 40% artist.
pub fn match_score(track: &TrackInfo, song: &Song) -> f64 {
    let title_sim = similarity(&track.title, song.title.as_deref().unwrap_or(""));
    let artist_sim = similarity(&track.artist, song.effective_artist());
    (title_sim * 0.6) + (artist_sim * 0.4)
}

/// Resolve each backend track to its best unclaimed catalog song.
///
/// Candidates come from an artist lookup, so a track whose artist spelling
/// shares no case-insensitive equality with any catalog row stays unmatched
/// even when a good title match exists elsewhere. Each song is claimed by at
/// most one track per call.
pub async fn match_tracks(pool: &SqlitePool, tracks: &[TrackInfo]) -> Result<MatchOutcome> {
    let mut matches = Vec::new();
    let mut stats = MatchStats {
        total: tracks.len(),
        ..Default::default()
    };
    let mut claimed: HashSet<i64> = HashSet::new();

    for track in tracks {
        let candidates = songs::find_by_artist(pool, &track.artist).await?;
        let best = candidates
            .into_iter()
            .filter(|song| !claimed.contains(&song.id))
            .map(|song| {
                let score = match_score(track, &song);
                (song, score)
            })
            .filter(|(_, score)| *score >= MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((song, score)) => {
                debug!(
                    artist = %track.artist,
                    title = %track.title,
                    song_id = song.id,
                    score,
                    "track matched"
                );
                claimed.insert(song.id);
                stats.matched += 1;
                matches.push(MatchedTrack {
                    track: track.clone(),
                    song,
                    score,
                });
            }
            None => {
                debug!(artist = %track.artist, title = %track.title, "no catalog match");
                stats.unmatched += 1;
            }
        }
    }

    Ok(MatchOutcome { matches, stats })
}

fn strip_noise(folded: &str) -> String {
    let mut s = folded.trim();
    loop {
        let before = s.len();
        for suffix in NOISE_SUFFIXES {
            if let Some(stripped) = s.strip_suffix(suffix) {
                s = stripped.trim_end();
            }
        }
        if s.len() == before {
            break;
        }
    }
    s.to_string()
}
