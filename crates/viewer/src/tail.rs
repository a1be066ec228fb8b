//! Live-mode poll loop for a single service.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use logview_api::{LogSource, PageResponse, SourceResult, TailRequest};
use logview_core::Cursor;
use logview_store::{LogEntryStore, MergeStats};
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::sequencer::{RequestId, RequestSequencer};
use crate::ViewerUpdate;

/// A running poll loop. Dropping it stops the loop.
#[derive(Debug)]
struct TailSession {
    id: RequestId,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TailSession {
    fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.task.abort();
    }
}

#[derive(Debug)]
pub enum TailOutcome {
    Stale,
    Appended(MergeStats),
    Failed(logview_api::SourceError),
}

/// Forward cursor and poll loop for a single service in live mode.
#[derive(Debug, Default)]
pub struct TailController {
    seq: RequestSequencer,
    cursor: Option<Cursor>,
    session: Option<TailSession>,
}

impl TailController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Spawn the poll loop. The first poll runs immediately, then every `interval`.
    /// `template` carries the filter; its cursor is replaced by the controller's.
    pub fn start(
        &mut self,
        source: Arc<dyn LogSource>,
        mut template: TailRequest,
        interval: Duration,
        updates: mpsc::UnboundedSender<ViewerUpdate>,
    ) {
        self.halt();
        let id = self.seq.next();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let mut cursor = self.cursor.clone();
        info!(service = %template.service, interval_ms = interval.as_millis() as u64, resume = cursor.is_some(), "tail: session start");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
                template.from = logview_core::TailFrom::for_cursor(cursor.as_ref());
                template.cursor = cursor.clone();
                let t0 = Instant::now();
                let result = tokio::select! {
                    _ = &mut stop_rx => break,
                    r = source.query_tail(template.clone()) => r,
                };
                histogram!("logview_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0, "mode" => "tail");
                if let Ok(PageResponse { next_cursor: Some(next), .. }) = &result {
                    cursor = Some(next.clone());
                }
                if updates.send(ViewerUpdate::Tail { id, result }).is_err() {
                    break;
                }
            }
            debug!(id, "tail: loop ended");
        });
        self.session = Some(TailSession { id, stop: Some(stop_tx), task });
    }

    /// Stop polling and keep the cursor for a later resume.
    pub fn halt(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(id = session.id, "tail: session stop");
            session.stop();
        }
        self.seq.invalidate();
    }

    /// Stop polling and forget the cursor.
    pub fn stop(&mut self) {
        self.halt();
        self.cursor = None;
    }

    pub fn complete(&mut self, id: RequestId, result: SourceResult<PageResponse>, store: &mut LogEntryStore) -> TailOutcome {
        if !(self.session.is_some() && self.seq.is_current(id)) {
            counter!("logview_stale_responses_total", 1u64, "mode" => "tail");
            return TailOutcome::Stale;
        }
        match result {
            Ok(page) => {
                if page.next_cursor.is_some() {
                    self.cursor = page.next_cursor;
                }
                TailOutcome::Appended(store.append(page.entries))
            }
            Err(e) => TailOutcome::Failed(e),
        }
    }
}

impl Drop for TailController {
    fn drop(&mut self) {
        self.halt();
    }
}
