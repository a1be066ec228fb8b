//! Logview store: bounded, ordered (oldest -> newest), deduplicated entries.
//!
//! Merges are pure: they take the current sequence and return a new one. When
//! nothing changes the returned `Arc` is the same allocation, so callers can
//! skip re-rendering with `Arc::ptr_eq`.

#![forbid(unsafe_code)]

use std::sync::Arc;

use logview_core::{EntryKey, LogEntry, LogLevel};
use metrics::counter;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default cap on retained entries.
pub const MAX_ENTRIES: usize = 1000;

/// Shared, immutable entry sequence.
pub type Entries = Arc<Vec<LogEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Head,
    Tail,
}

/// What a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub added: usize,
    pub duplicates: usize,
    pub evicted: usize,
}

impl MergeStats {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.evicted > 0
    }
}

/// Add unseen `incoming` entries after `existing`; over `cap`, drop the oldest.
pub fn append_merge(existing: &Entries, incoming: Vec<LogEntry>, cap: usize) -> Entries {
    merge(existing, incoming, cap, Side::Tail).0
}

/// Add unseen `incoming` entries before `existing`; over `cap`, drop the newest.
pub fn prepend_merge(existing: &Entries, incoming: Vec<LogEntry>, cap: usize) -> Entries {
    merge(existing, incoming, cap, Side::Head).0
}

fn merge(existing: &Entries, incoming: Vec<LogEntry>, cap: usize, side: Side) -> (Entries, MergeStats) {
    let mut stats = MergeStats::default();
    if incoming.is_empty() && existing.len() <= cap {
        return (Arc::clone(existing), stats);
    }

    let fresh: Vec<LogEntry> = {
        let mut seen: FxHashSet<EntryKey<'_>> = existing.iter().map(LogEntry::key).collect();
        let mut keep = vec![false; incoming.len()];
        for (i, entry) in incoming.iter().enumerate() {
            if seen.insert(entry.key()) {
                keep[i] = true;
            } else {
                stats.duplicates += 1;
            }
        }
        drop(seen);
        incoming.into_iter().zip(keep).filter_map(|(e, k)| k.then_some(e)).collect()
    };
    stats.added = fresh.len();

    if fresh.is_empty() && existing.len() <= cap {
        return (Arc::clone(existing), stats);
    }

    let total = existing.len() + fresh.len();
    let overflow = total.saturating_sub(cap);
    let mut merged = Vec::with_capacity(total.min(cap));
    match side {
        Side::Tail => {
            merged.extend(existing.iter().cloned());
            merged.extend(fresh);
            merged.drain(..overflow);
        }
        Side::Head => {
            merged.extend(fresh);
            merged.extend(existing.iter().cloned());
            merged.truncate(cap);
        }
    }
    stats.evicted = overflow;
    // Evictions can eat what was just added; report the net count.
    stats.added = stats.added.min(merged.len());
    (Arc::new(merged), stats)
}

/// Counts rendered in the viewer header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTotals {
    pub total: usize,
    pub warning: usize,
    pub error: usize,
}

/// Owning wrapper around the current sequence plus its cap.
#[derive(Debug, Clone)]
pub struct LogEntryStore {
    entries: Entries,
    cap: usize,
    epoch: u64,
}

impl Default for LogEntryStore {
    fn default() -> Self {
        Self::with_cap(MAX_ENTRIES)
    }
}

impl LogEntryStore {
    pub fn with_cap(cap: usize) -> Self {
        Self { entries: Arc::new(Vec::new()), cap: cap.max(1), epoch: 0 }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped whenever the sequence is swapped for a different one.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn as_slice(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries = Arc::new(Vec::new());
            self.epoch += 1;
        }
    }

    /// Wholesale replacement used by an initial load. Keeps the newest `cap` entries.
    pub fn replace(&mut self, entries: Vec<LogEntry>) -> MergeStats {
        let empty: Entries = Arc::new(Vec::new());
        let (next, stats) = merge(&empty, entries, self.cap, Side::Tail);
        self.entries = next;
        self.epoch += 1;
        self.record(&stats, "replace");
        stats
    }

    pub fn append(&mut self, incoming: Vec<LogEntry>) -> MergeStats {
        let (next, stats) = merge(&self.entries, incoming, self.cap, Side::Tail);
        self.swap(next, &stats, "append");
        stats
    }

    pub fn prepend(&mut self, incoming: Vec<LogEntry>) -> MergeStats {
        let (next, stats) = merge(&self.entries, incoming, self.cap, Side::Head);
        self.swap(next, &stats, "prepend");
        stats
    }

    pub fn totals(&self) -> LevelTotals {
        let mut totals = LevelTotals { total: self.entries.len(), ..Default::default() };
        for e in self.entries.iter() {
            match e.level {
                LogLevel::Warning => totals.warning += 1,
                LogLevel::Error => totals.error += 1,
                _ => {}
            }
        }
        totals
    }

    fn swap(&mut self, next: Entries, stats: &MergeStats, op: &'static str) {
        if !Arc::ptr_eq(&self.entries, &next) {
            self.entries = next;
            self.epoch += 1;
        }
        self.record(stats, op);
    }

    fn record(&self, stats: &MergeStats, op: &'static str) {
        if stats.duplicates > 0 {
            counter!("logview_store_duplicates_total", stats.duplicates as u64);
        }
        if stats.evicted > 0 {
            counter!("logview_store_evicted_total", stats.evicted as u64);
        }
        debug!(op, added = stats.added, duplicates = stats.duplicates, evicted = stats.evicted, len = self.entries.len(), "store: merged");
    }
}
