//! Rockbox TagCache reader
//!
//! Rockbox keeps its track database under `.rockbox/` as a master index
//! (`database_idx.tcd`) plus one sidecar file per string tag
//! (`database_0.tcd` .. ). Everything is little-endian u32.
//!
//! The master index starts with a 24-byte header (magic, data size, entry
//! count, serial, commit id, dirty flag) followed by one 96-byte entry per
//! track: 23 tag slots and a flag word. For string tags the slot holds the
//! byte offset of the text inside the tag's sidecar file; for numeric tags
//! the slot holds the value itself. Sidecars start with a 12-byte header
//! (magic, data size, entry count) followed by `[u32 length][u32 master
//! id][length bytes of NUL-padded UTF-8]` records.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rockmix_common::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::songs::NewSong;

/// "TCH" + version 0x10
pub const TAGCACHE_MAGIC: u32 = 0x5443_4810;

/// Firmware directory under the device root that holds the database.
pub const ROCKBOX_DIR: &str = ".rockbox";

/// Master index file name inside `.rockbox/`.
pub const MASTER_INDEX: &str = "database_idx.tcd";

/// Tag slots per master entry; slot indices above this hold no tag.
const TAG_COUNT: usize = 23;

const FLAG_DELETED: u32 = 0x1;

// String tags, resolved through their sidecar files
const TAG_ARTIST: usize = 0;
const TAG_ALBUM: usize = 1;
const TAG_GENRE: usize = 2;
const TAG_TITLE: usize = 3;
const TAG_FILENAME: usize = 4;
const TAG_COMPOSER: usize = 5;
const TAG_COMMENT: usize = 6;
const TAG_ALBUM_ARTIST: usize = 7;

// Numeric tags, read straight from the slot word. Slots 8 and 12 hold
// grouping/canonical-artist strings and 17.. hold runtime statistics the
// catalog does not carry; all of those are ignored.
const TAG_YEAR: usize = 9;
const TAG_DISC: usize = 10;
const TAG_TRACK: usize = 11;
const TAG_BITRATE: usize = 13;
const TAG_LENGTH: usize = 14;
const TAG_PLAY_COUNT: usize = 15;
const TAG_RATING: usize = 16;

const STRING_TAGS: [usize; 8] = [
    TAG_ARTIST,
    TAG_ALBUM,
    TAG_GENRE,
    TAG_TITLE,
    TAG_FILENAME,
    TAG_COMPOSER,
    TAG_COMMENT,
    TAG_ALBUM_ARTIST,
];

/// Upper bound on a single sidecar text record. Anything larger means the
/// file is corrupt.
const MAX_TAG_DATA: u32 = 1 << 20;

/// Counters describing one read of the master index.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagCacheStats {
    pub total_entries: u32,
    pub deleted: u32,
    pub missing_filename: u32,
    pub serial: u32,
    pub commit_id: u32,
    pub dirty: bool,
}

/// Result of reading a device's TagCache.
#[derive(Debug)]
pub struct TagCacheIndex {
    pub tracks: Vec<NewSong>,
    pub stats: TagCacheStats,
}

/// Read the TagCache under `rockbox_dir` (the `.rockbox` directory).
///
/// Deleted entries are skipped, missing or corrupt sidecars degrade to
/// absent fields, and entries without a filename are never emitted. The
/// progress callback receives the processed-entry count every 100 entries
/// and once at the end.
pub fn read_tagcache(
    rockbox_dir: &Path,
    cancel: &CancellationToken,
    mut progress: impl FnMut(u32),
) -> Result<TagCacheIndex> {
    let master_path = rockbox_dir.join(MASTER_INDEX);
    let file = File::open(&master_path).map_err(|e| {
        Error::InvalidTagCache(format!("cannot open {}: {e}", master_path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let magic = read_u32(&mut reader, &master_path)?;
    if magic != TAGCACHE_MAGIC {
        return Err(Error::InvalidTagCache(format!(
            "bad magic {magic:#010x} in {} (expected {TAGCACHE_MAGIC:#010x})",
            master_path.display()
        )));
    }
    let data_size = read_u32(&mut reader, &master_path)?;
    let entry_count = read_u32(&mut reader, &master_path)?;
    let serial = read_u32(&mut reader, &master_path)?;
    let commit_id = read_u32(&mut reader, &master_path)?;
    let dirty = read_u32(&mut reader, &master_path)?;

    debug!(
        entries = entry_count,
        data_size,
        serial,
        commit_id,
        dirty,
        "reading TagCache master index"
    );
    if dirty != 0 {
        warn!("TagCache is marked dirty; the device may not have committed all scans");
    }

    // Sidecars are independent of one another; a missing or corrupt one
    // only blanks its own field.
    let mut sidecars: HashMap<usize, HashMap<u32, String>> = HashMap::new();
    for tag in STRING_TAGS {
        if let Some(table) = load_sidecar(rockbox_dir, tag) {
            sidecars.insert(tag, table);
        }
    }

    let mut stats = TagCacheStats {
        total_entries: entry_count,
        serial,
        commit_id,
        dirty: dirty != 0,
        ..Default::default()
    };
    let mut tracks = Vec::new();
    let mut entry = [0u8; (TAG_COUNT + 1) * 4];

    for index in 0..entry_count {
        if cancel.is_cancelled() {
            return Err(Error::OperationCancelled);
        }

        reader.read_exact(&mut entry).map_err(|_| {
            Error::InvalidTagCache(format!(
                "master index truncated at entry {index} of {entry_count}"
            ))
        })?;
        let words: Vec<u32> = entry
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        if (index + 1) % 100 == 0 {
            progress(index + 1);
        }

        let flags = words[TAG_COUNT];
        if flags & FLAG_DELETED != 0 {
            stats.deleted += 1;
            continue;
        }

        let lookup = |tag: usize| -> Option<String> {
            sidecars
                .get(&tag)
                .and_then(|table| table.get(&words[tag]))
                .filter(|text| !text.is_empty())
                .cloned()
        };

        let path = match lookup(TAG_FILENAME) {
            Some(path) => path,
            None => {
                stats.missing_filename += 1;
                continue;
            }
        };

        tracks.push(NewSong {
            title: lookup(TAG_TITLE),
            artist: lookup(TAG_ARTIST),
            album_artist: lookup(TAG_ALBUM_ARTIST),
            album: lookup(TAG_ALBUM),
            genre: lookup(TAG_GENRE),
            composer: lookup(TAG_COMPOSER),
            comment: lookup(TAG_COMMENT),
            year: numeric(words[TAG_YEAR]),
            disc_number: numeric(words[TAG_DISC]),
            track_number: numeric(words[TAG_TRACK]),
            bitrate: numeric(words[TAG_BITRATE]),
            duration: numeric(words[TAG_LENGTH]),
            play_count: numeric(words[TAG_PLAY_COUNT]),
            rating: numeric(words[TAG_RATING]),
            file_size: None,
            ..NewSong::new(path)
        });
    }
    progress(entry_count);

    debug!(
        tracks = tracks.len(),
        deleted = stats.deleted,
        missing_filename = stats.missing_filename,
        "TagCache read complete"
    );
    Ok(TagCacheIndex { tracks, stats })
}

/// Numeric slots use 0 for "not set"; some builds write -1 instead.
fn numeric(word: u32) -> Option<i64> {
    match word {
        0 | u32::MAX => None,
        v => Some(i64::from(v)),
    }
}

/// Load one sidecar file into an offset-keyed table.
///
/// Returns None when the file is missing or its header is unusable; the
/// caller then treats the whole tag as absent.
fn load_sidecar(rockbox_dir: &Path, tag: usize) -> Option<HashMap<u32, String>> {
    let path = rockbox_dir.join(format!("database_{tag}.tcd"));
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            warn!(tag, path = %path.display(), "sidecar unreadable: {e}");
            return None;
        }
    };
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 12];
    if reader.read_exact(&mut header).is_err() {
        warn!(tag, path = %path.display(), "sidecar header truncated");
        return None;
    }
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != TAGCACHE_MAGIC {
        warn!(tag, path = %path.display(), "sidecar has bad magic {magic:#010x}");
        return None;
    }

    let mut table = HashMap::new();
    // Offset of the next unread byte; slot values point at text starts.
    let mut offset: u32 = 12;
    let mut record = [0u8; 8];
    loop {
        match reader.read_exact(&mut record) {
            Ok(()) => {}
            // Clean EOF between records
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!(tag, path = %path.display(), "sidecar read failed: {e}");
                break;
            }
        }
        let length = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        // record[4..8] is the owning master entry id; not needed here
        if length > MAX_TAG_DATA {
            warn!(tag, path = %path.display(), length, "sidecar record too large, stopping");
            break;
        }

        let mut data = vec![0u8; length as usize];
        if reader.read_exact(&mut data).is_err() {
            warn!(tag, path = %path.display(), "sidecar truncated mid-record");
            break;
        }

        // Text is NUL-padded; Rockbox writes "<Untagged>" for absent tags
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let text = String::from_utf8_lossy(&data[..end]);
        let text = if text == "<Untagged>" {
            String::new()
        } else {
            text.into_owned()
        };

        table.insert(offset + 8, text);
        offset += 8 + length;
    }

    debug!(tag, entries = table.len(), "sidecar loaded");
    Some(table)
}

fn read_u32(reader: &mut impl Read, path: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::InvalidTagCache(format!("{} truncated in header", path.display())))?;
    Ok(u32::from_le_bytes(buf))
}
