//! Composite identity used for de-duplication.
//!
//! Two entries are the same entry when `service|file|line|timestamp|message`
//! match. Distinct lines sharing all five fields collapse into one; the store
//! keeps whichever arrived first.

use std::fmt;

use crate::LogEntry;

/// Borrowed identity key. Cheap to build for every entry in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey<'a> {
    pub service: &'a str,
    pub file: &'a str,
    pub line: Option<u64>,
    pub timestamp: &'a str,
    pub message: &'a str,
}

pub fn entry_key(entry: &LogEntry) -> EntryKey<'_> {
    EntryKey {
        service: &entry.service,
        file: &entry.file,
        line: entry.line,
        timestamp: &entry.timestamp,
        message: &entry.message,
    }
}

impl fmt::Display for EntryKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|", self.service, self.file)?;
        if let Some(line) = self.line {
            write!(f, "{}", line)?;
        }
        write!(f, "|{}|{}", self.timestamp, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;

    fn entry(line: Option<u64>, message: &str, raw: &str) -> LogEntry {
        LogEntry {
            service: "node_daemon".into(),
            file: "node_daemon.log".into(),
            line,
            timestamp: "01-02 03:04:05.006".into(),
            level: LogLevel::Info,
            message: message.into(),
            raw: raw.into(),
        }
    }

    #[test]
    fn raw_and_level_do_not_participate() {
        let a = entry(Some(3), "boot", "01-02 03:04:05.006 [INFO] boot");
        let mut b = entry(Some(3), "boot", "something else");
        b.level = LogLevel::Error;
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn line_distinguishes_otherwise_equal_entries() {
        let a = entry(Some(3), "boot", "");
        let b = entry(Some(4), "boot", "");
        let c = entry(None, "boot", "");
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn display_matches_pipe_layout() {
        let a = entry(Some(7), "ready", "");
        assert_eq!(a.key().to_string(), "node_daemon|node_daemon.log|7|01-02 03:04:05.006|ready");
        let b = entry(None, "ready", "");
        assert_eq!(b.key().to_string(), "node_daemon|node_daemon.log||01-02 03:04:05.006|ready");
    }
}
