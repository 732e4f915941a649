//! # Rockmix Common Library
//!
//! Shared foundation for the rockmix crates:
//! - Error taxonomy (`Error` / `Result`)
//! - Database pool initialization, schema, and shared models
//! - Source and playlist type enums
//! - Bounded in-memory log buffer

pub mod db;
pub mod error;
pub mod logbuf;
pub mod types;

pub use error::{Error, Result};
pub use logbuf::{LogBuffer, LogEntry, LogLevel};
pub use types::{PlaylistType, SourceKind};

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG` when set, otherwise `info`. Safe to call
/// more than once; later calls are ignored, which keeps parallel tests from
/// fighting over the global default.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
