//! Logview core types: log entries, cursors, identity and the query model.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod identity;
pub mod query;
pub mod wire;

pub use identity::{entry_key, EntryKey};
pub use query::{QueryModel, TimeRange};
pub use wire::{decode_page, RawLogEntry, WireError, WirePage};

pub mod prelude {
    pub use super::{
        entry_key, Cursor, Direction, EntryKey, LogEntry, LogLevel, QueryModel, TailFrom,
        TimeRange,
    };
}

/// Severity as reported by the source, normalized to four buckets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    #[default]
    Unknown,
}

impl LogLevel {
    /// Lenient parse used at the fetch boundary. Never fails.
    pub fn normalize(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            _ => LogLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match LogLevel::normalize(s) {
            LogLevel::Unknown if !s.eq_ignore_ascii_case("unknown") => {
                Err(format!("unknown log level: {}", s))
            }
            level => Ok(level),
        }
    }
}

/// A single log line as delivered by a source. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub service: String,
    /// Origin file or unit inside the service.
    pub file: String,
    /// Ordinal within `file`, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    /// Source-formatted timestamp; not comparable across services.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    /// Full original line.
    pub raw: String,
}

impl LogEntry {
    pub fn key(&self) -> EntryKey<'_> {
        entry_key(self)
    }

    /// Text shown for the row: the message, or the raw line when empty.
    pub fn display_text(&self) -> &str {
        if self.message.is_empty() { &self.raw } else { &self.message }
    }
}

/// Opaque continuation token. Only ever handed back to the source that issued it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paging direction for `query_page`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Backward,
    Forward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Backward => "backward",
            Direction::Forward => "forward",
        }
    }
}

/// Where a cursor-less tail read starts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TailFrom {
    Start,
    #[default]
    End,
}

impl TailFrom {
    /// First poll anchors at the end; later polls resume from the cursor.
    pub fn for_cursor(cursor: Option<&Cursor>) -> Self {
        if cursor.is_some() { TailFrom::Start } else { TailFrom::End }
    }
}
