//! # Rockmix Core
//!
//! Playlist generation for Rockbox devices. The pipeline:
//!
//! 1. [`tagcache`] reads the firmware's binary database (with [`scanner`]
//!    as the filesystem fallback) into catalog rows stored via [`db`].
//! 2. [`sources`] talks to Last.fm, Spotify and MusicBrainz behind one
//!    capability trait.
//! 3. [`matcher`] resolves fetched tracks against the catalog by fuzzy
//!    artist/title similarity.
//! 4. [`playlist`] assembles and persists playlists and exports them as
//!    `.m3u8` files the firmware picks up.
//!
//! [`service::App`] wires the pieces together for a front-end.

pub mod db;
pub mod matcher;
pub mod playlist;
pub mod scanner;
pub mod service;
pub mod sources;
pub mod tagcache;

pub use playlist::{GenerateReport, GenerateRequest};
pub use service::{App, MatchLibraryReport, ParseStatus, ParseSummary};
