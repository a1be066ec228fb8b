//! Viewer tuning knobs and their `LOGVIEW_*` environment overrides.

#![forbid(unsafe_code)]

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Live polling cadence offered by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TailInterval {
    #[default]
    #[serde(rename = "3s")]
    Secs3,
    #[serde(rename = "5s")]
    Secs5,
    #[serde(rename = "10s")]
    Secs10,
}

impl TailInterval {
    pub const ALL: [TailInterval; 3] = [TailInterval::Secs3, TailInterval::Secs5, TailInterval::Secs10];

    pub fn from_secs(secs: u64) -> Option<Self> {
        match secs {
            3 => Some(TailInterval::Secs3),
            5 => Some(TailInterval::Secs5),
            10 => Some(TailInterval::Secs10),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Duration {
        match self {
            TailInterval::Secs3 => Duration::from_secs(3),
            TailInterval::Secs5 => Duration::from_secs(5),
            TailInterval::Secs10 => Duration::from_secs(10),
        }
    }
}

impl FromStr for TailInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s.trim().trim_end_matches('s');
        secs.parse::<u64>()
            .ok()
            .and_then(TailInterval::from_secs)
            .ok_or_else(|| format!("tail interval must be 3, 5 or 10 seconds, got {}", s))
    }
}

/// Viewer tuning knobs. Pixel values are in the host's layout units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    pub max_entries: usize,
    pub page_limit: usize,
    pub row_height: f64,
    pub overscan: usize,
    pub padding: f64,
    /// Used until the host reports a real viewport height.
    pub default_viewport_height: f64,
    pub near_top_threshold: f64,
    pub load_more_interval: Duration,
    pub anchor_tolerance: f64,
    pub keyword_debounce: Duration,
    pub tail_interval: TailInterval,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            page_limit: 100,
            row_height: 56.0,
            overscan: 6,
            padding: 8.0,
            default_viewport_height: 480.0,
            near_top_threshold: 60.0,
            load_more_interval: Duration::from_millis(500),
            anchor_tolerance: 12.0,
            keyword_debounce: Duration::from_millis(300),
            tail_interval: TailInterval::Secs3,
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by `LOGVIEW_*` environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_entries: env_or("LOGVIEW_MAX_ENTRIES", d.max_entries).max(1),
            page_limit: env_or("LOGVIEW_PAGE_LIMIT", d.page_limit).max(1),
            row_height: positive(env_or("LOGVIEW_ROW_HEIGHT", d.row_height), d.row_height),
            overscan: env_or("LOGVIEW_OVERSCAN", d.overscan),
            padding: env_or("LOGVIEW_PADDING", d.padding).max(0.0),
            default_viewport_height: positive(env_or("LOGVIEW_VIEWPORT_HEIGHT", d.default_viewport_height), d.default_viewport_height),
            near_top_threshold: env_or("LOGVIEW_NEAR_TOP_PX", d.near_top_threshold),
            load_more_interval: Duration::from_millis(env_or("LOGVIEW_LOAD_MORE_MS", d.load_more_interval.as_millis() as u64)),
            anchor_tolerance: env_or("LOGVIEW_ANCHOR_TOLERANCE_PX", d.anchor_tolerance),
            keyword_debounce: Duration::from_millis(env_or("LOGVIEW_KEYWORD_DEBOUNCE_MS", d.keyword_debounce.as_millis() as u64)),
            tail_interval: env_or("LOGVIEW_TAIL_INTERVAL_SECS", d.tail_interval),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "config: invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn positive(v: f64, default: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { default }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_interval_parses_known_values_only() {
        assert_eq!("5".parse::<TailInterval>(), Ok(TailInterval::Secs5));
        assert_eq!("10s".parse::<TailInterval>(), Ok(TailInterval::Secs10));
        assert!("4".parse::<TailInterval>().is_err());
        assert_eq!(TailInterval::default().as_duration(), Duration::from_secs(3));
    }

    #[test]
    fn env_overrides_and_fallbacks() {
        std::env::set_var("LOGVIEW_TEST_OK", "42");
        std::env::set_var("LOGVIEW_TEST_BAD", "forty");
        assert_eq!(env_or("LOGVIEW_TEST_OK", 1usize), 42);
        assert_eq!(env_or("LOGVIEW_TEST_BAD", 7usize), 7);
        assert_eq!(env_or("LOGVIEW_TEST_UNSET", 3usize), 3);
    }
}
