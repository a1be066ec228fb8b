//! Keyword input debounce.

#![forbid(unsafe_code)]

use std::time::Duration;

use logview_core::query::normalize_keyword;
use tokio::time::Instant;

/// Holds raw keyword input until it has been quiet for `delay`.
#[derive(Debug, Clone)]
pub struct KeywordDebounce {
    delay: Duration,
    pending: Option<(String, Instant)>,
}

impl KeywordDebounce {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn input(&mut self, raw: &str, now: Instant) {
        self.pending = Some((raw.to_string(), now));
    }

    /// When the pending input becomes committable.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, at)| *at + self.delay)
    }

    /// The trimmed keyword (`None` when blank) once the quiet period has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Option<String>> {
        let due = self.deadline().is_some_and(|d| now >= d);
        if !due {
            return None;
        }
        self.pending.take().map(|(raw, _)| normalize_keyword(Some(raw.as_str())))
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}
