//! Fetch-boundary schema. Everything coming off the wire passes through here
//! before it reaches the store; merge and windowing code only sees `LogEntry`.

use serde::Deserialize;
use serde_json::Value;

use crate::{Cursor, LogEntry, LogLevel};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("page payload is not an object")]
    NotAnObject,
    #[error("entries field is not an array")]
    EntriesNotArray,
}

/// Loose wire shape of an entry. Unknown fields are ignored; missing or
/// mistyped ones are defaulted one field at a time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawLogEntry {
    pub service: Option<Value>,
    pub file: Option<Value>,
    pub line: Option<Value>,
    pub timestamp: Option<Value>,
    pub level: Option<Value>,
    pub message: Option<Value>,
    pub raw: Option<Value>,
}

fn text(v: Option<Value>) -> Option<String> {
    match v {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

impl RawLogEntry {
    pub fn normalize(self) -> LogEntry {
        let line = self.line.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let message = text(self.message).unwrap_or_default();
        let raw = text(self.raw).unwrap_or_else(|| message.clone());
        LogEntry {
            service: text(self.service).unwrap_or_default(),
            file: text(self.file).unwrap_or_default(),
            line,
            timestamp: text(self.timestamp).unwrap_or_default(),
            level: text(self.level).as_deref().map(LogLevel::normalize).unwrap_or_default(),
            message,
            raw,
        }
    }
}

/// Decoded page body: `{entries, nextCursor?, hasMore?}`.
#[derive(Debug, Clone, Default)]
pub struct WirePage {
    pub entries: Vec<LogEntry>,
    pub next_cursor: Option<Cursor>,
    pub has_more: Option<bool>,
    /// Entries that could not be read as objects.
    pub skipped: usize,
}

pub fn decode_page(value: &Value) -> Result<WirePage, WireError> {
    let obj = value.as_object().ok_or(WireError::NotAnObject)?;
    let mut page = WirePage::default();
    match obj.get("entries") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            page.entries.reserve(items.len());
            for item in items {
                match RawLogEntry::deserialize(item) {
                    Ok(raw) if item.is_object() => page.entries.push(raw.normalize()),
                    _ => page.skipped += 1,
                }
            }
        }
        Some(_) => return Err(WireError::EntriesNotArray),
    }
    page.next_cursor = obj
        .get("nextCursor")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(Cursor::new);
    page.has_more = obj.get("hasMore").and_then(Value::as_bool);
    Ok(page)
}
