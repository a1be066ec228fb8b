//! Scroll position bookkeeping across prepends and fresh loads.

#![forbid(unsafe_code)]

/// Scroll position and content height read from the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollSnapshot {
    pub scroll_offset: f64,
    pub scroll_height: f64,
}

/// Keeps the rows under the reader still across prepends, and opens fresh
/// queries at the newest entry.
#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    tolerance: f64,
    pending: Option<ScrollSnapshot>,
    bottom_once: bool,
}

impl ScrollAnchor {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance, pending: None, bottom_once: false }
    }

    /// Taken right before an older page is requested.
    pub fn snapshot(&mut self, at: ScrollSnapshot) {
        self.pending = Some(at);
    }

    pub fn arm_bottom(&mut self) {
        self.bottom_once = true;
    }

    /// Nothing was prepended; forget the snapshot.
    pub fn cancel_restore(&mut self) {
        self.pending = None;
    }

    pub fn clear(&mut self) {
        self.pending = None;
        self.bottom_once = false;
    }

    pub fn has_pending_restore(&self) -> bool {
        self.pending.is_some()
    }

    pub fn bottom_armed(&self) -> bool {
        self.bottom_once
    }

    /// Called once the host has laid out new content. Returns the offset to scroll to.
    pub fn on_layout(&mut self, live: ScrollSnapshot) -> Option<f64> {
        let pending = self.pending.take();
        if self.bottom_once {
            self.bottom_once = false;
            return Some(live.scroll_height);
        }
        let snap = pending?;
        // The reader moved while the page was in flight; leave them where they are.
        if (live.scroll_offset - snap.scroll_offset).abs() > self.tolerance {
            return None;
        }
        let delta = live.scroll_height - snap.scroll_height;
        Some(snap.scroll_offset + delta)
    }
}
