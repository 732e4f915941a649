//! Common error types for rockmix
//!
//! One taxonomy for the whole workspace. Backend failures keep their
//! underlying cause reachable through `std::error::Error::source` so
//! callers can walk the chain.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SourceKind;

/// Common result type for rockmix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error raised anywhere in the rockmix core
#[derive(Error, Debug)]
pub enum Error {
    /// No Rockbox device root has been configured
    #[error("rockbox path is not set")]
    RockboxPathNotSet,

    /// Configured device root is missing or not a directory
    #[error("rockbox path is not a valid directory: {0}")]
    RockboxPathInvalid(PathBuf),

    /// Device root exists but carries no TagCache database
    #[error("rockbox database not found: {0}")]
    RockboxDatabaseNotFound(PathBuf),

    /// A parse run is already active; only one may run at a time
    #[error("a library parse is already in progress")]
    ParseInProgress,

    /// Playlist assembly from pre-fetched tracks was given none
    #[error("no pre-fetched tracks available")]
    NoPreFetchedData,

    /// Matching produced zero local songs for a generate request
    #[error("no matching songs found in the local library")]
    NoMatchingSongs,

    /// Unknown playlist type string from a front-end
    #[error("invalid playlist type: {0:?}")]
    InvalidPlaylistType(String),

    /// Unknown data source string from a front-end
    #[error("invalid data source: {0:?}")]
    InvalidDataSource(String),

    /// Tag playlists need a seed tag
    #[error("tag is required for tag playlists")]
    TagRequired,

    /// Playlist row lookup miss
    #[error("playlist not found: {0}")]
    PlaylistNotFound(i64),

    /// Song row lookup miss (id, device id or path)
    #[error("song not found: {0}")]
    SongNotFound(String),

    /// Configuration key lookup miss
    #[error("configuration key not found: {0}")]
    ConfigNotFound(String),

    /// TagCache database could not be parsed (bad magic, truncated file, ...)
    #[error("invalid tagcache database: {0}")]
    InvalidTagCache(String),

    /// Backend requires credentials that have not been set
    #[error("{backend} API key is missing")]
    ApiKeyMissing { backend: SourceKind },

    /// Backend signalled rate limiting; retry later
    #[error("{backend} rate limit exceeded, retry later")]
    ApiRateLimited { backend: SourceKind },

    /// Backend rejected the configured credentials
    #[error("{backend} rejected the configured credentials")]
    ApiUnauthorized { backend: SourceKind },

    /// Any other backend failure, with status code and underlying cause
    #[error("{backend} request failed (status {status}): {message}")]
    ApiRequestFailed {
        backend: SourceKind,
        status: u16,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A track search returned no usable result
    #[error("no match found for \"{artist} - {title}\"")]
    NoMatchFound { artist: String, title: String },

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    OperationCancelled,

    /// Invalid user input or request parameter
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an `ApiRequestFailed` with a wrapped cause.
    pub fn api_failed<E>(backend: SourceKind, status: u16, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::ApiRequestFailed {
            backend,
            status,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Build an `ApiRequestFailed` without an underlying cause.
    pub fn api_status(backend: SourceKind, status: u16, message: impl Into<String>) -> Self {
        Error::ApiRequestFailed {
            backend,
            status,
            message: message.into(),
            cause: None,
        }
    }

    /// Stable kebab-case code for front-ends mapping errors to exit codes.
    pub fn code(&self) -> &'static str {
        match self {
            Error::RockboxPathNotSet => "rockbox-path-not-set",
            Error::RockboxPathInvalid(_) => "rockbox-path-invalid",
            Error::RockboxDatabaseNotFound(_) => "rockbox-database-not-found",
            Error::ParseInProgress => "parse-in-progress",
            Error::NoPreFetchedData => "no-pre-fetched-data",
            Error::NoMatchingSongs => "no-matching-songs",
            Error::InvalidPlaylistType(_) => "invalid-playlist-type",
            Error::InvalidDataSource(_) => "invalid-data-source",
            Error::TagRequired => "tag-required",
            Error::PlaylistNotFound(_) => "playlist-not-found",
            Error::SongNotFound(_) => "song-not-found",
            Error::ConfigNotFound(_) => "config-not-found",
            Error::InvalidTagCache(_) => "invalid-tagcache",
            Error::ApiKeyMissing { .. } => "api-key-missing",
            Error::ApiRateLimited { .. } => "api-rate-limited",
            Error::ApiUnauthorized { .. } => "api-unauthorized",
            Error::ApiRequestFailed { .. } => "api-request-failed",
            Error::NoMatchFound { .. } => "no-match-found",
            Error::OperationCancelled => "operation-cancelled",
            Error::InvalidInput(_) => "invalid-input",
            Error::Database(_) => "database-error",
            Error::Io(_) => "io-error",
            Error::Internal(_) => "internal-error",
        }
    }
}
