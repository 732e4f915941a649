//! Bounded in-memory log buffer
//!
//! Front-ends poll this ring instead of tailing process output. Appends
//! evict the oldest entry once the buffer is full; reads return copies so
//! the lock is never held across caller code.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default ring capacity when none is given.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Severity of a buffered log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// One buffered log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Fixed-capacity ring of log entries with its own lock
#[derive(Debug)]
pub struct LogBuffer {
    max: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogBuffer {
    /// Create a buffer holding at most `max` entries (0 falls back to the default).
    pub fn new(max: usize) -> Self {
        let max = if max == 0 { DEFAULT_LOG_CAPACITY } else { max };
        Self {
            max,
            entries: Mutex::new(VecDeque::with_capacity(max)),
        }
    }

    /// Append an entry, evicting the oldest when the ring is full.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            time: Utc::now(),
            level,
            message: message.into(),
        };
        let mut entries = self.lock();
        if entries.len() == self.max {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing has been logged since the last clear.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all buffered entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<LogEntry>> {
        // A poisoned lock only means a writer panicked mid-append; the ring
        // itself is still usable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
