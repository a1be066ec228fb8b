#![forbid(unsafe_code)]

use base64::{engine::general_purpose, Engine as _};
use logview_core::{Cursor, Direction};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Position of the last line handed out by a page scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub service: String,
    pub file: String,
    pub line_index: u64,
    pub direction: Direction,
}

/// Byte offset reached by a tail read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TailCursor {
    pub file: String,
    pub offset: u64,
}

pub fn encode<T: Serialize>(value: &T) -> Cursor {
    let payload = serde_json::to_vec(value).unwrap_or_default();
    Cursor::new(general_purpose::STANDARD.encode(payload))
}

/// Tokens that fail to decode are treated as absent.
pub fn decode<T: DeserializeOwned>(cursor: &Cursor) -> Option<T> {
    let bytes = general_purpose::STANDARD.decode(cursor.as_str()).ok()?;
    serde_json::from_slice(&bytes).ok()
}
