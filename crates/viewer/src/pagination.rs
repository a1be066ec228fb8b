//! Backward paging through history, triggered by scrolling near the top.

#![forbid(unsafe_code)]

use std::time::Duration;

use logview_api::{PageResponse, SourceError, SourceResult};
use logview_core::Cursor;
use logview_store::{LogEntryStore, MergeStats};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::sequencer::{RequestId, RequestSequencer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageState {
    #[default]
    Idle,
    LoadingInitial,
    LoadingMore,
}

/// Which kind of backward request a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageMode {
    Initial,
    More,
}

impl PageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageMode::Initial => "initial",
            PageMode::More => "more",
        }
    }
}

#[derive(Debug)]
pub enum PageOutcome {
    /// Superseded by a newer request; nothing changed.
    Stale,
    Loaded(MergeStats),
    Failed(SourceError),
}

/// Scroll facts the load-more trigger looks at.
#[derive(Debug, Clone, Copy)]
pub struct ScrollProbe {
    pub scroll_offset: f64,
    pub scrolling_up: bool,
    pub tail_active: bool,
}

/// Backward cursor, loading state and the throttled "load older" trigger.
#[derive(Debug)]
pub struct PaginationController {
    seq: RequestSequencer,
    state: PageState,
    cursor: Option<Cursor>,
    last_trigger: Option<Instant>,
    near_top: f64,
    min_interval: Duration,
}

impl PaginationController {
    pub fn new(near_top: f64, min_interval: Duration) -> Self {
        Self { seq: RequestSequencer::new(), state: PageState::Idle, cursor: None, last_trigger: None, near_top, min_interval }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// An absent cursor means the oldest entry has been reached (or nothing loaded yet).
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Drop in-flight work; keep the cursor.
    pub fn cancel(&mut self) {
        self.seq.invalidate();
        self.state = PageState::Idle;
    }

    /// Forget everything about the previous query.
    pub fn reset(&mut self) {
        self.cancel();
        self.cursor = None;
        self.last_trigger = None;
    }

    pub fn begin_initial(&mut self) -> RequestId {
        self.state = PageState::LoadingInitial;
        self.seq.next()
    }

    pub fn should_load_more(&self, probe: ScrollProbe, now: Instant) -> bool {
        if probe.tail_active || self.cursor.is_none() || self.state != PageState::Idle {
            return false;
        }
        if !(probe.scrolling_up && probe.scroll_offset < self.near_top) {
            return false;
        }
        match self.last_trigger {
            Some(at) => now.saturating_duration_since(at) > self.min_interval,
            None => true,
        }
    }

    /// Start an older-page request; `None` when there is nothing older.
    pub fn begin_more(&mut self, now: Instant) -> Option<(RequestId, Cursor)> {
        let cursor = self.cursor.clone()?;
        self.last_trigger = Some(now);
        self.state = PageState::LoadingMore;
        Some((self.seq.next(), cursor))
    }

    /// Apply a response if `id` is still current.
    pub fn complete(&mut self, id: RequestId, mode: PageMode, result: SourceResult<PageResponse>, store: &mut LogEntryStore) -> PageOutcome {
        if !self.seq.is_current(id) {
            counter!("logview_stale_responses_total", 1u64, "mode" => mode.as_str());
            debug!(id, current = self.seq.current(), mode = mode.as_str(), "pagination: stale response dropped");
            return PageOutcome::Stale;
        }
        self.state = PageState::Idle;
        match result {
            Ok(page) => {
                let stats = match mode {
                    PageMode::Initial => store.replace(page.entries),
                    PageMode::More => store.prepend(page.entries),
                };
                self.cursor = page.next_cursor;
                PageOutcome::Loaded(stats)
            }
            Err(e) => PageOutcome::Failed(e),
        }
    }
}
