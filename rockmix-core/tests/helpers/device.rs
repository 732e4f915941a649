//! On-disk Rockbox device fixtures
//!
//! Writes a TagCache database in the firmware's binary format: a master
//! index (`database_idx.tcd`, 24-byte header plus one 96-byte entry per
//! track) and one sidecar file per string tag holding
//! `[u32 length][u32 master id][NUL-padded text]` records. Master slots
//! carry the byte offset of the text inside the sidecar.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const MAGIC: u32 = 0x5443_4810;
const TAG_COUNT: usize = 23;

const TAG_ARTIST: usize = 0;
const TAG_ALBUM: usize = 1;
const TAG_GENRE: usize = 2;
const TAG_TITLE: usize = 3;
const TAG_FILENAME: usize = 4;
const TAG_ALBUM_ARTIST: usize = 7;
const TAG_YEAR: usize = 9;
const TAG_TRACK: usize = 11;
const TAG_LENGTH: usize = 14;

const STRING_TAGS: [usize; 6] = [
    TAG_ARTIST,
    TAG_ALBUM,
    TAG_GENRE,
    TAG_TITLE,
    TAG_FILENAME,
    TAG_ALBUM_ARTIST,
];

/// One track to place in the fixture database.
#[derive(Debug, Clone, Default)]
pub struct Track {
    pub path: String,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub duration: Option<u32>,
}

impl Track {
    pub fn new(path: &str, artist: &str, title: &str) -> Self {
        Self {
            path: path.to_string(),
            artist: Some(artist.to_string()),
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn album(mut self, album: &str) -> Self {
        self.album = Some(album.to_string());
        self
    }

    pub fn album_artist(mut self, artist: &str) -> Self {
        self.album_artist = Some(artist.to_string());
        self
    }

    pub fn genre(mut self, genre: &str) -> Self {
        self.genre = Some(genre.to_string());
        self
    }

    pub fn duration(mut self, seconds: u32) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn numbered(mut self, track_number: u32, year: u32) -> Self {
        self.track_number = Some(track_number);
        self.year = Some(year);
        self
    }

    fn text_for(&self, tag: usize) -> Option<&str> {
        match tag {
            TAG_ARTIST => self.artist.as_deref(),
            TAG_ALBUM => self.album.as_deref(),
            TAG_GENRE => self.genre.as_deref(),
            TAG_TITLE => self.title.as_deref(),
            TAG_FILENAME => Some(self.path.as_str()),
            TAG_ALBUM_ARTIST => self.album_artist.as_deref(),
            _ => None,
        }
    }

    fn numeric_for(&self, slot: usize) -> u32 {
        match slot {
            TAG_YEAR => self.year.unwrap_or(0),
            TAG_TRACK => self.track_number.unwrap_or(0),
            TAG_LENGTH => self.duration.unwrap_or(0),
            _ => 0,
        }
    }
}

/// A mounted-player stand-in rooted in a temp directory.
pub struct FakeDevice {
    dir: TempDir,
}

impl FakeDevice {
    /// Device with a well-formed TagCache listing `tracks`.
    pub fn with_tagcache(tracks: &[Track]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_tagcache(&dir.path().join(".rockbox"), tracks);
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn root_str(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// Where an exported playlist of the given file name would land.
    pub fn playlist_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join("Playlists").join(file_name)
    }
}

fn write_tagcache(rockbox: &Path, tracks: &[Track]) {
    fs::create_dir_all(rockbox).unwrap();

    // Sidecars first; master slots reference the text offsets.
    let mut slots: Vec<HashMap<usize, u32>> = vec![HashMap::new(); tracks.len()];
    for tag in STRING_TAGS {
        let mut body = Vec::new();
        let mut count = 0u32;
        for (idx, track) in tracks.iter().enumerate() {
            let Some(text) = track.text_for(tag) else {
                continue;
            };
            let mut data = text.as_bytes().to_vec();
            data.push(0);
            slots[idx].insert(tag, 12 + body.len() as u32 + 8);
            body.extend_from_slice(&(data.len() as u32).to_le_bytes());
            body.extend_from_slice(&(idx as u32).to_le_bytes());
            body.extend_from_slice(&data);
            count += 1;
        }

        let mut file = Vec::new();
        file.extend_from_slice(&MAGIC.to_le_bytes());
        file.extend_from_slice(&(body.len() as u32).to_le_bytes());
        file.extend_from_slice(&count.to_le_bytes());
        file.extend_from_slice(&body);
        fs::write(rockbox.join(format!("database_{tag}.tcd")), file).unwrap();
    }

    let mut master = Vec::new();
    master.extend_from_slice(&MAGIC.to_le_bytes());
    master.extend_from_slice(&((tracks.len() * 96) as u32).to_le_bytes());
    master.extend_from_slice(&(tracks.len() as u32).to_le_bytes());
    master.extend_from_slice(&1u32.to_le_bytes()); // serial
    master.extend_from_slice(&1u32.to_le_bytes()); // commit id
    master.extend_from_slice(&0u32.to_le_bytes()); // dirty
    for (idx, track) in tracks.iter().enumerate() {
        for slot in 0..TAG_COUNT {
            let value = slots[idx]
                .get(&slot)
                .copied()
                .unwrap_or_else(|| track.numeric_for(slot));
            master.extend_from_slice(&value.to_le_bytes());
        }
        master.extend_from_slice(&0u32.to_le_bytes()); // flags
    }
    fs::write(rockbox.join("database_idx.tcd"), master).unwrap();
}
