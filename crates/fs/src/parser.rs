#![forbid(unsafe_code)]

use logview_core::LogLevel;
use once_cell::sync::Lazy;
use regex::Regex;

// "<timestamp> [<LEVEL>] <message>"; the timestamp is everything before the first '['.
static STAMPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[]*)\[([^\]]*)\](.*)$").expect("static pattern"));

/// A parsed line: `(timestamp, level, message)`. Timestamp is empty when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
}

pub fn split_log_line(line: &str) -> SplitLine {
    let trimmed = line.trim();
    if let Some(caps) = STAMPED.captures(trimmed) {
        let ts = caps.get(1).map(|m| m.as_str().trim_end()).unwrap_or("");
        if !ts.is_empty() {
            let level = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let message = caps.get(3).map(|m| m.as_str().trim_start()).unwrap_or("");
            return SplitLine {
                timestamp: ts.to_string(),
                level: LogLevel::normalize(level),
                message: message.to_string(),
            };
        }
    }
    SplitLine { timestamp: String::new(), level: LogLevel::Unknown, message: trimmed.to_string() }
}

/// Timestamp and level of the last stamped line; continuation lines inherit it.
pub type LineContext = (String, LogLevel);

/// Parse one raw line, updating `context` when the line carries its own stamp.
/// Blank lines and unstamped lines with no preceding stamp yield `None`.
pub fn extract_entry(raw: &str, context: &mut Option<LineContext>) -> Option<SplitLine> {
    let trimmed = raw.trim_end();
    if trimmed.is_empty() {
        return None;
    }
    let split = split_log_line(trimmed);
    if !split.timestamp.is_empty() {
        let level = if split.level == LogLevel::Unknown { LogLevel::Info } else { split.level };
        let message = if split.message.is_empty() { trimmed.to_string() } else { split.message };
        *context = Some((split.timestamp.clone(), level));
        return Some(SplitLine { timestamp: split.timestamp, level, message });
    }
    let (ts, level) = context.as_ref()?;
    Some(SplitLine { timestamp: ts.clone(), level: *level, message: trimmed.trim().to_string() })
}

/// `node_daemon` -> `Node Daemon`.
pub fn service_label(id: &str) -> String {
    id.split(|ch| ch == '_' || ch == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
