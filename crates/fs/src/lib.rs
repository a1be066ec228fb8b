//! Logview fs backend: one directory per service under a root, plain-text log files inside.
//!
//! Page scans walk files newest-first (by mtime) and hand out line-indexed
//! cursors; tail reads follow the newest file of a single service by byte offset.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use chrono::{DateTime, Utc};
use logview_core::{Cursor, Direction, LogEntry, LogLevel, TailFrom};
use metrics::histogram;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod cursor;
pub mod parser;

use cursor::{PageCursor, TailCursor};
use parser::{extract_entry, LineContext};

pub const DEFAULT_ROOT: &str = "/opt/buckyos/logs";
pub const DEFAULT_LIMIT: usize = 200;
pub const MAX_LIMIT: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("missing service")]
    MissingService,
    #[error("unknown log service: {0}")]
    UnknownService(String),
    #[error("tail requires exactly one service")]
    TailNeedsOneService,
    #[error("no log files found for {0}")]
    NoFiles(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> FsError {
    let context = context.into();
    move |source| FsError::Io { context, source }
}

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub label: String,
    pub path: String,
}

/// Filtered page scan over one or more services.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub services: Vec<String>,
    pub file: Option<String>,
    pub direction: Direction,
    pub level: Option<LogLevel>,
    pub keyword: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub cursor: Option<Cursor>,
}

/// Tail read over a single service.
#[derive(Debug, Clone, Default)]
pub struct TailScan {
    pub service: String,
    pub file: Option<String>,
    pub level: Option<LogLevel>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<Cursor>,
    pub from: TailFrom,
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub entries: Vec<LogEntry>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
struct LogFileRef {
    service: String,
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

/// Pre-computed filters shared by page and tail scans.
struct LineFilter {
    level: Option<LogLevel>,
    keyword: Option<String>,
    since_key: Option<String>,
    until_key: Option<String>,
}

impl LineFilter {
    fn new(level: Option<LogLevel>, keyword: Option<&str>, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            level,
            keyword: keyword.map(str::trim).filter(|k| !k.is_empty()).map(str::to_lowercase),
            since_key: since.as_ref().map(time_key),
            until_key: until.as_ref().map(time_key),
        }
    }

    fn accepts(&self, ts: &str, level: LogLevel, raw: &str) -> bool {
        if let Some(want) = self.level {
            if level != want {
                return false;
            }
        }
        if let Some(kw) = self.keyword.as_deref() {
            if !raw.to_lowercase().contains(kw) {
                return false;
            }
        }
        if self.since_key.is_some() || self.until_key.is_some() {
            if ts.is_empty() {
                return false;
            }
            if let Some(since) = self.since_key.as_deref() {
                if ts < since {
                    return false;
                }
            }
            if let Some(until) = self.until_key.as_deref() {
                if ts > until {
                    return false;
                }
            }
        }
        true
    }
}

/// Log timestamps carry no year; compare in the same `MM-DD hh:mm:ss.mmm` layout.
pub fn time_key(value: &DateTime<Utc>) -> String {
    value.format("%m-%d %H:%M:%S%.3f").to_string()
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// File-backed log backend rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsLogBackend {
    root: PathBuf,
}

impl FsLogBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `LOGVIEW_ROOT`, else the default install location.
    pub fn from_env() -> Self {
        Self::new(std::env::var("LOGVIEW_ROOT").unwrap_or_else(|_| DEFAULT_ROOT.to_string()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn service_ids(&self) -> FsResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(io_err("failed to read log root"))?;
        let mut ids: Vec<String> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    pub fn list_services(&self) -> FsResult<Vec<ServiceInfo>> {
        Ok(self
            .service_ids()?
            .into_iter()
            .map(|id| ServiceInfo {
                label: parser::service_label(&id),
                path: self.root.join(&id).display().to_string(),
                id,
            })
            .collect())
    }

    fn check_services(&self, services: &[String]) -> FsResult<()> {
        if services.is_empty() {
            return Err(FsError::MissingService);
        }
        let available = self.service_ids()?;
        match services.iter().find(|s| !available.contains(s)) {
            Some(unknown) => Err(FsError::UnknownService(unknown.clone())),
            None => Ok(()),
        }
    }

    fn collect_files(&self, service: &str, file_filter: Option<&str>) -> FsResult<Vec<LogFileRef>> {
        let dir = self.root.join(service);
        let entries = std::fs::read_dir(&dir).map_err(io_err(format!("failed to read log dir {}", service)))?;
        let mut files = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else { continue };
            if file_filter.is_some_and(|f| f != name) {
                continue;
            }
            let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(LogFileRef { service: service.to_string(), name, path, modified });
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(files)
    }

    /// One page of matching entries, oldest -> newest within the page.
    pub fn query(&self, req: &ScanRequest) -> FsResult<ScanPage> {
        let t0 = Instant::now();
        self.check_services(&req.services)?;
        let limit = clamp_limit(req.limit);
        let filter = LineFilter::new(req.level, req.keyword.as_deref(), req.since, req.until);

        let mut files = Vec::new();
        for service in &req.services {
            files.extend(self.collect_files(service, req.file.as_deref())?);
        }
        files.sort_by(|a, b| b.modified.cmp(&a.modified));

        // Cursors from the other direction or for vanished files are ignored.
        let cursor = req
            .cursor
            .as_ref()
            .and_then(cursor::decode::<PageCursor>)
            .filter(|c| c.direction == req.direction)
            .filter(|c| files.iter().any(|f| f.service == c.service && f.name == c.file));

        let page = match req.direction {
            Direction::Backward => scan_backward(&files, cursor.as_ref(), &filter, limit)?,
            Direction::Forward => scan_forward(&files, cursor.as_ref(), &filter, limit)?,
        };
        let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
        histogram!("logview_fs_query_ms", took_ms);
        info!(services = req.services.len(), direction = req.direction.as_str(), entries = page.entries.len(), has_more = page.has_more, took_ms, "fs: query ok");
        Ok(page)
    }

    /// New lines of a service's newest file since the cursor (or the last `limit` lines).
    pub fn tail(&self, req: &TailScan) -> FsResult<ScanPage> {
        if req.service.is_empty() {
            return Err(FsError::TailNeedsOneService);
        }
        self.check_services(std::slice::from_ref(&req.service))?;
        let limit = clamp_limit(req.limit);
        let filter = LineFilter::new(req.level, req.keyword.as_deref(), None, None);

        let files = self.collect_files(&req.service, req.file.as_deref())?;
        let file = files.first().ok_or_else(|| FsError::NoFiles(req.service.clone()))?;

        let cursor = req.cursor.as_ref().and_then(cursor::decode::<TailCursor>);
        let (start_offset, from_end) = match cursor {
            Some(c) if c.file == file.name => (c.offset, false),
            // Rotated to a new file: read it from the beginning.
            Some(_) => (0, false),
            None => (0, req.from != TailFrom::Start),
        };

        let mut handle = File::open(&file.path).map_err(io_err("failed to open log file"))?;
        let file_len = handle.metadata().map_err(io_err("failed to read log metadata"))?.len();
        // A truncated file restarts from the top.
        let start = if from_end || start_offset > file_len { 0 } else { start_offset };
        handle.seek(SeekFrom::Start(start)).map_err(io_err("failed to seek log file"))?;
        let mut buf = Vec::new();
        handle
            .take(file_len - start)
            .read_to_end(&mut buf)
            .map_err(io_err("failed to read log file"))?;
        let text = String::from_utf8_lossy(&buf);
        let mut lines: Vec<&str> = text.lines().collect();
        if from_end && lines.len() > limit {
            lines.drain(..lines.len() - limit);
        }

        let mut ctx: Option<LineContext> = None;
        let mut entries = Vec::new();
        for raw in lines {
            let Some(split) = extract_entry(raw, &mut ctx) else { continue };
            let raw_line = raw.trim_end();
            if !filter.accepts(&split.timestamp, split.level, raw_line) {
                continue;
            }
            entries.push(LogEntry {
                service: req.service.clone(),
                file: file.name.clone(),
                line: None,
                timestamp: split.timestamp,
                level: split.level,
                message: split.message,
                raw: raw_line.to_string(),
            });
        }
        debug!(service = %req.service, file = %file.name, from_end, start_offset, new_offset = file_len, entries = entries.len(), "fs: tail read");
        Ok(ScanPage {
            entries,
            next_cursor: Some(cursor::encode(&TailCursor { file: file.name.clone(), offset: file_len })),
            has_more: false,
        })
    }
}

/// Parsed, filtered lines of one file as `(line_index, entry)`.
fn read_candidates(file: &LogFileRef, filter: &LineFilter) -> FsResult<Vec<(u64, LogEntry)>> {
    let handle = File::open(&file.path).map_err(io_err(format!("failed to open log file {}", file.name)))?;
    let mut reader = BufReader::new(handle);
    let mut ctx: Option<LineContext> = None;
    let mut out = Vec::new();
    let mut buf = Vec::new();
    let mut index = 0u64;
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).map_err(io_err(format!("failed to read log file {}", file.name)))?;
        if n == 0 {
            break;
        }
        let line_index = index;
        index += 1;
        let raw = String::from_utf8_lossy(&buf);
        let raw = raw.trim_end_matches(['\n', '\r']);
        let Some(split) = extract_entry(raw, &mut ctx) else { continue };
        let raw_line = raw.trim_end();
        if !filter.accepts(&split.timestamp, split.level, raw_line) {
            continue;
        }
        out.push((
            line_index,
            LogEntry {
                service: file.service.clone(),
                file: file.name.clone(),
                line: Some(line_index),
                timestamp: split.timestamp,
                level: split.level,
                message: split.message,
                raw: raw_line.to_string(),
            },
        ));
    }
    Ok(out)
}

fn page_cursor(file: &LogFileRef, line_index: u64, direction: Direction) -> Cursor {
    cursor::encode(&PageCursor { service: file.service.clone(), file: file.name.clone(), line_index, direction })
}

fn scan_backward(files: &[LogFileRef], cursor: Option<&PageCursor>, filter: &LineFilter, limit: usize) -> FsResult<ScanPage> {
    let start = cursor
        .and_then(|c| files.iter().position(|f| f.service == c.service && f.name == c.file))
        .unwrap_or(0);
    let mut collected = Vec::new();
    let mut next_cursor = None;
    'files: for file in &files[start..] {
        let mut candidates = read_candidates(file, filter)?;
        if let Some(c) = cursor.filter(|c| c.service == file.service && c.file == file.name) {
            candidates.retain(|(idx, _)| *idx < c.line_index);
        }
        for (idx, entry) in candidates.into_iter().rev() {
            collected.push(entry);
            if collected.len() >= limit {
                next_cursor = Some(page_cursor(file, idx, Direction::Backward));
                break 'files;
            }
        }
    }
    collected.reverse();
    Ok(ScanPage { has_more: next_cursor.is_some(), entries: collected, next_cursor })
}

fn scan_forward(files: &[LogFileRef], cursor: Option<&PageCursor>, filter: &LineFilter, limit: usize) -> FsResult<ScanPage> {
    let mut reached = cursor.is_none();
    let mut entries = Vec::new();
    let mut next_cursor = None;
    'files: for file in files {
        let at_cursor_file = cursor.is_some_and(|c| c.service == file.service && c.file == file.name);
        if !reached && !at_cursor_file {
            continue;
        }
        for (idx, entry) in read_candidates(file, filter)? {
            if !reached {
                if let Some(c) = cursor {
                    if idx <= c.line_index {
                        continue;
                    }
                }
                reached = true;
            }
            entries.push(entry);
            if entries.len() >= limit {
                next_cursor = Some(page_cursor(file, idx, Direction::Forward));
                break 'files;
            }
        }
        reached = true;
    }
    Ok(ScanPage { has_more: next_cursor.is_some(), entries, next_cursor })
}
