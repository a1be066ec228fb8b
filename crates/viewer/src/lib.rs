//! Logview viewer engine.
//!
//! Turns a paginated, append-only `LogSource` into a bounded, deduplicated,
//! scroll-virtualized view. The `Viewer` owns all mutable state; fetches run as
//! spawned tasks that report back over an unbounded channel, and the host drains
//! that channel (`process_updates` / `next_update`) on its own loop.

#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use logview_api::{record_fetch_error, LogSource, PageRequest, PageResponse, SourceResult, TailRequest};
use logview_core::{Cursor, LogEntry, LogLevel, QueryModel, TimeRange};
use logview_store::{LevelTotals, LogEntryStore};
use metrics::histogram;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

pub mod anchor;
pub mod config;
pub mod debounce;
pub mod pagination;
pub mod sequencer;
pub mod tail;
pub mod virtualizer;

pub use anchor::{ScrollAnchor, ScrollSnapshot};
pub use config::{TailInterval, ViewerConfig};
pub use debounce::KeywordDebounce;
pub use pagination::{PageMode, PageOutcome, PageState, PaginationController, ScrollProbe};
pub use sequencer::{RequestId, RequestSequencer};
pub use tail::{TailController, TailOutcome};
pub use virtualizer::{RowGeometry, VirtualWindow};

/// Completed fetch, delivered back to the viewer.
#[derive(Debug)]
pub enum ViewerUpdate {
    Page { id: RequestId, mode: PageMode, result: SourceResult<PageResponse> },
    Tail { id: RequestId, result: SourceResult<PageResponse> },
}

/// A scroll event as read from the host's scroll container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    pub scroll_offset: f64,
    pub viewport_height: f64,
    pub scroll_height: f64,
}

/// What the rendering collaborator draws.
#[derive(Debug, Clone)]
pub struct RenderWindow<'a> {
    pub visible_entries: &'a [LogEntry],
    /// Index of `visible_entries[0]` in the full sequence.
    pub start_index: usize,
    pub top_spacer_height: f64,
    pub bottom_spacer_height: f64,
    pub total_entries: usize,
    pub is_loading_initial: bool,
    pub is_loading_more: bool,
    pub has_more: bool,
    pub is_tailing: bool,
    pub last_error: Option<&'a str>,
    pub totals: LevelTotals,
}

#[derive(Debug, Clone, Copy)]
struct Viewport {
    scroll_offset: f64,
    viewport_height: f64,
    last_offset: f64,
}

/// Live log-stream viewer state for one mounted view.
pub struct Viewer {
    source: Arc<dyn LogSource>,
    config: ViewerConfig,
    geometry: RowGeometry,
    query: QueryModel,
    live: bool,
    tail_interval: TailInterval,
    store: LogEntryStore,
    pagination: PaginationController,
    tail: TailController,
    anchor: ScrollAnchor,
    keyword: KeywordDebounce,
    viewport: Viewport,
    laid_out_epoch: u64,
    last_error: Option<String>,
    updates_tx: mpsc::UnboundedSender<ViewerUpdate>,
    updates_rx: mpsc::UnboundedReceiver<ViewerUpdate>,
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("query", &self.query)
            .field("live", &self.live)
            .field("entries", &self.store.len())
            .field("pagination", &self.pagination.state())
            .field("tailing", &self.tail.is_running())
            .finish()
    }
}

impl Viewer {
    pub fn new(source: Arc<dyn LogSource>, config: ViewerConfig) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            geometry: RowGeometry { row_height: config.row_height, overscan: config.overscan, padding: config.padding },
            query: QueryModel::default(),
            live: false,
            tail_interval: config.tail_interval,
            store: LogEntryStore::with_cap(config.max_entries),
            pagination: PaginationController::new(config.near_top_threshold, config.load_more_interval),
            tail: TailController::new(),
            anchor: ScrollAnchor::new(config.anchor_tolerance),
            keyword: KeywordDebounce::new(config.keyword_debounce),
            viewport: Viewport { scroll_offset: 0.0, viewport_height: config.default_viewport_height, last_offset: 0.0 },
            laid_out_epoch: 0,
            last_error: None,
            source,
            config,
            updates_tx,
            updates_rx,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn query(&self) -> &QueryModel {
        &self.query
    }

    pub fn store(&self) -> &LogEntryStore {
        &self.store
    }

    pub fn backward_cursor(&self) -> Option<&Cursor> {
        self.pagination.cursor()
    }

    pub fn tail_cursor(&self) -> Option<&Cursor> {
        self.tail.cursor()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Tailing needs live mode and exactly one selected service.
    pub fn tail_active(&self) -> bool {
        self.live && self.query.single_service().is_some()
    }

    pub fn scroll_offset(&self) -> f64 {
        self.viewport.scroll_offset
    }

    /// Scrollable height of the current entries, for hosts without their own layout.
    pub fn content_height(&self) -> f64 {
        self.geometry.content_height(self.store.len())
    }

    // ----------------- query changes -----------------

    /// Replace the query. Any change is a hard reset.
    pub fn set_query(&mut self, query: QueryModel) {
        if query == self.query {
            return;
        }
        self.query = query;
        self.hard_reset();
    }

    pub fn set_services<I, S>(&mut self, services: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next = QueryModel { services: services.into_iter().map(Into::into).collect(), ..self.query.clone() };
        self.set_query(next);
    }

    /// Select one service; selecting the one already shown refreshes it.
    pub fn select_service(&mut self, service: &str) {
        if self.query.single_service() == Some(service) {
            self.refresh();
        } else {
            self.set_services([service]);
        }
    }

    pub fn clear_services(&mut self) {
        self.set_services(Vec::<String>::new());
    }

    pub fn set_level(&mut self, level: Option<LogLevel>) {
        let next = self.query.clone().with_level(level);
        self.set_query(next);
    }

    /// `None` removes the lower time bound.
    pub fn set_time_range(&mut self, range: Option<TimeRange>, now: DateTime<Utc>) {
        let next = self.query.clone().with_since(range.map(|r| r.since(now)));
        self.set_query(next);
    }

    /// Raw keyword input; committed by `poll_keyword` once it has been quiet long enough.
    pub fn set_keyword_input(&mut self, raw: &str) {
        self.keyword.input(raw, Instant::now());
    }

    pub fn keyword_deadline(&self) -> Option<Instant> {
        self.keyword.deadline()
    }

    /// Commit a settled keyword. Returns true when the query changed.
    pub fn poll_keyword(&mut self) -> bool {
        let Some(keyword) = self.keyword.poll(Instant::now()) else { return false };
        if keyword == self.query.keyword {
            return false;
        }
        let next = QueryModel { keyword, ..self.query.clone() };
        self.set_query(next);
        true
    }

    /// Re-issue the current query from scratch and reopen at the newest entry.
    pub fn refresh(&mut self) {
        info!(services = %self.query.selection_key(), "viewer: refresh");
        self.pagination.cancel();
        self.anchor.cancel_restore();
        self.anchor.arm_bottom();
        if self.tail_active() {
            self.tail.stop();
            self.store.clear();
            self.start_tail();
        } else {
            self.start_initial();
        }
    }

    pub fn set_live(&mut self, enabled: bool) {
        if self.live == enabled {
            return;
        }
        let was_active = self.tail_active();
        self.live = enabled;
        let now_active = self.tail_active();
        info!(live = enabled, tailing = now_active, "viewer: live mode");
        match (was_active, now_active) {
            (false, true) => {
                self.pagination.reset();
                self.anchor.clear();
                self.store.clear();
                self.anchor.arm_bottom();
                self.start_tail();
            }
            (true, false) => {
                self.tail.stop();
                self.anchor.clear();
                self.anchor.arm_bottom();
                self.start_initial();
            }
            _ => {}
        }
    }

    /// Change the poll cadence; a running loop restarts and resumes from its cursor.
    pub fn set_tail_interval(&mut self, interval: TailInterval) {
        if self.tail_interval == interval {
            return;
        }
        self.tail_interval = interval;
        if self.tail.is_running() {
            self.start_tail();
        }
    }

    fn hard_reset(&mut self) {
        info!(services = %self.query.selection_key(), level = ?self.query.level, keyword = ?self.query.keyword, since = ?self.query.since, "viewer: query reset");
        self.pagination.reset();
        self.tail.stop();
        self.anchor.clear();
        self.store.clear();
        self.last_error = None;
        self.viewport.scroll_offset = 0.0;
        self.viewport.last_offset = 0.0;
        if self.query.is_empty() {
            return;
        }
        self.anchor.arm_bottom();
        if self.tail_active() {
            self.start_tail();
        } else {
            self.start_initial();
        }
    }

    // ----------------- fetches -----------------

    fn start_initial(&mut self) {
        if self.query.is_empty() {
            self.store.clear();
            return;
        }
        let id = self.pagination.begin_initial();
        let req = PageRequest::initial(&self.query, self.config.page_limit);
        self.spawn_page(id, PageMode::Initial, req);
    }

    fn start_tail(&mut self) {
        let Some(template) = TailRequest::for_query(&self.query, None, self.config.page_limit) else { return };
        self.tail.start(Arc::clone(&self.source), template, self.tail_interval.as_duration(), self.updates_tx.clone());
    }

    fn spawn_page(&self, id: RequestId, mode: PageMode, req: PageRequest) {
        debug!(id, mode = mode.as_str(), has_cursor = req.cursor.is_some(), "viewer: page request");
        let source = Arc::clone(&self.source);
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result = source.query_page(req).await;
            histogram!("logview_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0, "mode" => mode.as_str());
            let _ = tx.send(ViewerUpdate::Page { id, mode, result });
        });
    }

    // ----------------- scroll + layout -----------------

    /// Feed a scroll event. Returns true when it triggered an older-page load.
    pub fn on_scroll(&mut self, ev: ScrollEvent) -> bool {
        let scrolling_up = ev.scroll_offset < self.viewport.last_offset;
        self.viewport.last_offset = ev.scroll_offset;
        self.viewport.scroll_offset = ev.scroll_offset;
        if ev.viewport_height > 0.0 {
            self.viewport.viewport_height = ev.viewport_height;
        }
        let probe = ScrollProbe { scroll_offset: ev.scroll_offset, scrolling_up, tail_active: self.tail_active() };
        let now = Instant::now();
        if !self.pagination.should_load_more(probe, now) {
            return false;
        }
        let Some((id, cursor)) = self.pagination.begin_more(now) else { return false };
        self.anchor.snapshot(ScrollSnapshot { scroll_offset: ev.scroll_offset, scroll_height: ev.scroll_height });
        let req = PageRequest::older(&self.query, cursor, self.config.page_limit);
        self.spawn_page(id, PageMode::More, req);
        true
    }

    /// Host finished laying out the current entries. Returns the scroll offset to apply, if any.
    pub fn layout_settled(&mut self, live: ScrollSnapshot) -> Option<f64> {
        if self.store.epoch() == self.laid_out_epoch {
            return None;
        }
        self.laid_out_epoch = self.store.epoch();
        // A cleared store is not the first load; keep the bottom jump armed for it.
        if self.store.is_empty() {
            return None;
        }
        let target = self.anchor.on_layout(live)?;
        debug!(from = live.scroll_offset, to = target, "viewer: scroll anchored");
        self.viewport.scroll_offset = target;
        self.viewport.last_offset = target;
        Some(target)
    }

    // ----------------- updates -----------------

    /// Apply every completed fetch waiting in the channel. Returns how many were drained.
    pub fn process_updates(&mut self) -> usize {
        let mut n = 0;
        while let Ok(update) = self.updates_rx.try_recv() {
            self.apply_update(update);
            n += 1;
        }
        n
    }

    /// Wait for the next completed fetch and apply it.
    pub async fn next_update(&mut self) -> bool {
        match self.updates_rx.recv().await {
            Some(update) => {
                self.apply_update(update);
                true
            }
            None => false,
        }
    }

    pub fn apply_update(&mut self, update: ViewerUpdate) {
        match update {
            ViewerUpdate::Page { id, mode, result } => {
                match self.pagination.complete(id, mode, result, &mut self.store) {
                    PageOutcome::Stale => {}
                    PageOutcome::Loaded(stats) => {
                        self.last_error = None;
                        if mode == PageMode::More && !stats.changed() {
                            self.anchor.cancel_restore();
                        }
                        debug!(mode = mode.as_str(), added = stats.added, len = self.store.len(), has_more = self.pagination.has_more(), "viewer: page applied");
                    }
                    PageOutcome::Failed(e) => {
                        record_fetch_error(mode.as_str(), &e);
                        if mode == PageMode::More {
                            self.anchor.cancel_restore();
                        }
                        self.last_error = Some(e.to_string());
                    }
                }
            }
            ViewerUpdate::Tail { id, result } => match self.tail.complete(id, result, &mut self.store) {
                TailOutcome::Stale => {}
                TailOutcome::Appended(stats) => {
                    self.last_error = None;
                    if stats.added > 0 {
                        debug!(added = stats.added, evicted = stats.evicted, len = self.store.len(), "viewer: tail applied");
                    }
                }
                TailOutcome::Failed(e) => {
                    record_fetch_error("tail", &e);
                    self.last_error = Some(e.to_string());
                }
            },
        }
    }

    // ----------------- render surface -----------------

    pub fn window(&self) -> RenderWindow<'_> {
        let entries = self.store.as_slice();
        let w = self.geometry.window(self.viewport.scroll_offset, self.viewport.viewport_height, entries.len());
        let state = self.pagination.state();
        RenderWindow {
            visible_entries: &entries[w.start..w.end],
            start_index: w.start,
            top_spacer_height: w.top_spacer,
            bottom_spacer_height: w.bottom_spacer,
            total_entries: entries.len(),
            is_loading_initial: state == PageState::LoadingInitial,
            is_loading_more: state == PageState::LoadingMore,
            has_more: self.pagination.has_more(),
            is_tailing: self.tail.is_running(),
            last_error: self.last_error.as_deref(),
            totals: self.store.totals(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Tear down: stop polling and invalidate every in-flight request.
    pub fn unmount(&mut self) {
        self.tail.stop();
        self.pagination.cancel();
        self.keyword.clear();
        info!("viewer: unmounted");
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.tail.stop();
    }
}
