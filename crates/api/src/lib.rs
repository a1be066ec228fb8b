//! Logview source API.
//!
//! This crate defines the data-source seam the viewer engine depends on:
//! `query_page` for backward/forward pages and `query_tail` for live polling.
//! Implementations can be in-process (fs-backed) or scripted (tests); a remote
//! transport would implement the same trait.

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use logview_core::{decode_page, Cursor, Direction, LogEntry, LogLevel, QueryModel, TailFrom};
use logview_fs::{FsError, FsLogBackend, ScanPage, ScanRequest, TailScan};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A selectable log service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: String,
    pub label: String,
}

/// `queryPage(filter, cursor?, direction, limit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: QueryModel,
    pub cursor: Option<Cursor>,
    pub direction: Direction,
    pub limit: usize,
}

impl PageRequest {
    /// First page of a query: no cursor, newest entries first.
    pub fn initial(query: &QueryModel, limit: usize) -> Self {
        Self { query: query.clone(), cursor: None, direction: Direction::Backward, limit }
    }

    pub fn older(query: &QueryModel, cursor: Cursor, limit: usize) -> Self {
        Self { query: query.clone(), cursor: Some(cursor), direction: Direction::Backward, limit }
    }
}

/// `queryTail(filter, cursor?, from, limit)`; always a single service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailRequest {
    pub service: String,
    pub level: Option<LogLevel>,
    pub keyword: Option<String>,
    pub cursor: Option<Cursor>,
    pub from: TailFrom,
    pub limit: usize,
}

impl TailRequest {
    /// `None` unless the query selects exactly one service.
    pub fn for_query(query: &QueryModel, cursor: Option<Cursor>, limit: usize) -> Option<Self> {
        let service = query.single_service()?.to_string();
        Some(Self {
            service,
            level: query.level,
            keyword: query.keyword.clone(),
            from: TailFrom::for_cursor(cursor.as_ref()),
            cursor,
            limit,
        })
    }
}

/// Page (or tail chunk) as returned by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub entries: Vec<LogEntry>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl PageResponse {
    pub fn new(entries: Vec<LogEntry>, next_cursor: Option<Cursor>) -> Self {
        let has_more = next_cursor.is_some();
        Self { entries, next_cursor, has_more }
    }

    /// Decode the wire shape `{entries, nextCursor?, hasMore?}`.
    pub fn from_wire(value: &serde_json::Value) -> SourceResult<Self> {
        let page = decode_page(value).map_err(|e| SourceError::Validation(e.to_string()))?;
        if page.skipped > 0 {
            warn!(skipped = page.skipped, "api: dropped malformed entries");
        }
        let has_more = page.has_more.unwrap_or(page.next_cursor.is_some());
        Ok(Self { entries: page.entries, next_cursor: page.next_cursor, has_more })
    }
}

impl From<ScanPage> for PageResponse {
    fn from(p: ScanPage) -> Self {
        Self { entries: p.entries, next_cursor: p.next_cursor, has_more: p.has_more }
    }
}

/// API errors suitable for transport over RPC.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("io: {0}")]
    Io(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

impl From<FsError> for SourceError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::UnknownService(_) | FsError::NoFiles(_) => SourceError::NotFound(e.to_string()),
            FsError::MissingService | FsError::TailNeedsOneService => SourceError::Validation(e.to_string()),
            FsError::Io { .. } => SourceError::Io(e.to_string()),
        }
    }
}

/// Paginated, append-only log source.
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    async fn services(&self) -> SourceResult<Vec<ServiceInfo>>;

    async fn query_page(&self, req: PageRequest) -> SourceResult<PageResponse>;

    async fn query_tail(&self, req: TailRequest) -> SourceResult<PageResponse>;
}

// ----------------- In-process implementation -----------------

/// In-process source reading log files directly.
#[derive(Debug, Clone)]
pub struct InProcSource {
    backend: Arc<FsLogBackend>,
}

impl InProcSource {
    pub fn new(backend: FsLogBackend) -> Self {
        Self { backend: Arc::new(backend) }
    }

    pub fn from_env() -> Self {
        Self::new(FsLogBackend::from_env())
    }

    async fn blocking<T, F>(&self, mode: &'static str, f: F) -> SourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FsLogBackend) -> Result<T, FsError> + Send + 'static,
    {
        let t0 = Instant::now();
        let backend = Arc::clone(&self.backend);
        let res = tokio::task::spawn_blocking(move || f(&backend))
            .await
            .map_err(|e| SourceError::Internal(e.to_string()))?
            .map_err(SourceError::from);
        histogram!("logview_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0, "mode" => mode);
        res
    }
}

#[async_trait::async_trait]
impl LogSource for InProcSource {
    async fn services(&self) -> SourceResult<Vec<ServiceInfo>> {
        let t0 = Instant::now();
        let list = self.blocking("services", |b| b.list_services()).await?;
        let out: Vec<ServiceInfo> = list.into_iter().map(|s| ServiceInfo { id: s.id, label: s.label }).collect();
        info!(count = out.len(), took_ms = %t0.elapsed().as_millis(), "api: services ok");
        Ok(out)
    }

    async fn query_page(&self, req: PageRequest) -> SourceResult<PageResponse> {
        let t0 = Instant::now();
        info!(services = %req.query.selection_key(), direction = req.direction.as_str(), limit = req.limit, has_cursor = req.cursor.is_some(), "api: query_page start");
        let scan = ScanRequest {
            services: req.query.services.iter().cloned().collect(),
            file: None,
            direction: req.direction,
            level: req.query.level,
            keyword: req.query.keyword.clone(),
            since: req.query.since,
            until: None,
            limit: Some(req.limit),
            cursor: req.cursor,
        };
        let page = self.blocking("page", move |b| b.query(&scan)).await?;
        info!(entries = page.entries.len(), has_more = page.has_more, took_ms = %t0.elapsed().as_millis(), "api: query_page ok");
        Ok(page.into())
    }

    async fn query_tail(&self, req: TailRequest) -> SourceResult<PageResponse> {
        let t0 = Instant::now();
        let scan = TailScan {
            service: req.service,
            file: None,
            level: req.level,
            keyword: req.keyword,
            limit: Some(req.limit),
            cursor: req.cursor,
            from: req.from,
        };
        let page = self.blocking("tail", move |b| b.tail(&scan)).await?;
        info!(entries = page.entries.len(), took_ms = %t0.elapsed().as_millis(), "api: query_tail ok");
        Ok(page.into())
    }
}

// ----------------- Mock implementation -----------------

/// One scripted reply, optionally delayed to force out-of-order completion.
#[derive(Debug, Clone)]
struct Scripted {
    delay: Duration,
    result: SourceResult<PageResponse>,
}

#[derive(Debug, Default)]
struct MockState {
    pages: VecDeque<Scripted>,
    tails: VecDeque<Scripted>,
    page_calls: Vec<PageRequest>,
    tail_calls: Vec<TailRequest>,
}

/// Scripted in-memory source for tests.
///
/// Replies are consumed in call order. When a queue runs dry, pages come back
/// empty and exhausted, and tails come back empty with the request cursor echoed.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    pub services: Vec<ServiceInfo>,
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services<I: IntoIterator<Item = &'static str>>(ids: I) -> Self {
        let services = ids.into_iter().map(|id| ServiceInfo { id: id.to_string(), label: id.to_string() }).collect();
        Self { services, ..Self::default() }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_page(&self, result: SourceResult<PageResponse>) {
        self.push_page_after(Duration::ZERO, result);
    }

    pub fn push_page_after(&self, delay: Duration, result: SourceResult<PageResponse>) {
        self.lock().pages.push_back(Scripted { delay, result });
    }

    /// Queue a page decoded from its wire form.
    pub fn push_page_json(&self, value: serde_json::Value) {
        self.push_page(PageResponse::from_wire(&value));
    }

    pub fn push_tail(&self, result: SourceResult<PageResponse>) {
        self.push_tail_after(Duration::ZERO, result);
    }

    pub fn push_tail_after(&self, delay: Duration, result: SourceResult<PageResponse>) {
        self.lock().tails.push_back(Scripted { delay, result });
    }

    pub fn page_calls(&self) -> Vec<PageRequest> {
        self.lock().page_calls.clone()
    }

    pub fn tail_calls(&self) -> Vec<TailRequest> {
        self.lock().tail_calls.clone()
    }
}

#[async_trait::async_trait]
impl LogSource for MockSource {
    async fn services(&self) -> SourceResult<Vec<ServiceInfo>> {
        Ok(self.services.clone())
    }

    async fn query_page(&self, req: PageRequest) -> SourceResult<PageResponse> {
        let scripted = {
            let mut st = self.lock();
            st.page_calls.push(req);
            st.pages.pop_front()
        };
        match scripted {
            Some(s) => {
                if !s.delay.is_zero() {
                    tokio::time::sleep(s.delay).await;
                }
                s.result
            }
            None => Ok(PageResponse::default()),
        }
    }

    async fn query_tail(&self, req: TailRequest) -> SourceResult<PageResponse> {
        let echo = req.cursor.clone();
        let scripted = {
            let mut st = self.lock();
            st.tail_calls.push(req);
            st.tails.pop_front()
        };
        match scripted {
            Some(s) => {
                if !s.delay.is_zero() {
                    tokio::time::sleep(s.delay).await;
                }
                s.result
            }
            None => Ok(PageResponse { entries: Vec::new(), next_cursor: echo, has_more: false }),
        }
    }
}

/// Record a failed fetch for the given mode.
pub fn record_fetch_error(mode: &'static str, err: &SourceError) {
    counter!("logview_fetch_errors_total", 1u64, "mode" => mode);
    warn!(mode, error = %err, "api: fetch failed");
}
