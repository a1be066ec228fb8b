//! Query model: the filter whose change invalidates every piece of viewer state.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::LogLevel;

/// Composed filter. Carries no cursor; cursors live with the controllers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryModel {
    pub services: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl QueryModel {
    pub fn for_services<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { services: services.into_iter().map(Into::into).collect(), ..Default::default() }
    }

    pub fn with_level(mut self, level: Option<LogLevel>) -> Self {
        self.level = level;
        self
    }

    /// Blank keywords are dropped so `Some("")` and `None` compare equal.
    pub fn with_keyword(mut self, keyword: Option<&str>) -> Self {
        self.keyword = normalize_keyword(keyword);
        self
    }

    pub fn with_since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// The only selected service, if exactly one is selected.
    pub fn single_service(&self) -> Option<&str> {
        if self.services.len() == 1 {
            self.services.iter().next().map(String::as_str)
        } else {
            None
        }
    }

    /// Stable selection identity (sorted ids joined by `|`).
    pub fn selection_key(&self) -> String {
        self.services.iter().map(String::as_str).collect::<Vec<_>>().join("|")
    }
}

pub fn normalize_keyword(keyword: Option<&str>) -> Option<String> {
    keyword.map(str::trim).filter(|k| !k.is_empty()).map(str::to_string)
}

/// Relative time-range presets offered by the viewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[serde(rename = "15m")]
    Last15m,
    #[default]
    #[serde(rename = "1h")]
    Last1h,
    #[serde(rename = "24h")]
    Last24h,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        match self {
            TimeRange::Last15m => Duration::minutes(15),
            TimeRange::Last1h => Duration::hours(1),
            TimeRange::Last24h => Duration::hours(24),
        }
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeRange::Last15m => "Last 15m",
            TimeRange::Last1h => "Last 1h",
            TimeRange::Last24h => "Last 24h",
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(TimeRange::Last15m),
            "1h" => Ok(TimeRange::Last1h),
            "24h" => Ok(TimeRange::Last24h),
            other => Err(format!("unsupported range {} (expected 15m, 1h or 24h)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn blank_keyword_is_none() {
        let a = QueryModel::for_services(["a"]).with_keyword(Some("   "));
        let b = QueryModel::for_services(["a"]);
        assert_eq!(a, b);
        let c = QueryModel::for_services(["a"]).with_keyword(Some("  boot "));
        assert_eq!(c.keyword.as_deref(), Some("boot"));
    }

    #[test]
    fn single_service_only_for_exactly_one() {
        assert_eq!(QueryModel::for_services(["a"]).single_service(), Some("a"));
        assert_eq!(QueryModel::for_services(["a", "b"]).single_service(), None);
        assert_eq!(QueryModel::default().single_service(), None);
    }

    #[test]
    fn selection_key_is_order_independent() {
        let a = QueryModel::for_services(["b", "a"]);
        let b = QueryModel::for_services(["a", "b"]);
        assert_eq!(a.selection_key(), "a|b");
        assert_eq!(a.selection_key(), b.selection_key());
    }

    #[test]
    fn range_resolves_against_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(TimeRange::Last15m.since(now), Utc.with_ymd_and_hms(2024, 5, 1, 11, 45, 0).unwrap());
        assert_eq!(TimeRange::Last24h.since(now), Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap());
        assert_eq!("1h".parse::<TimeRange>().unwrap(), TimeRange::Last1h);
        assert!("2h".parse::<TimeRange>().is_err());
    }
}
