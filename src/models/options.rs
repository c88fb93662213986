//! Range options controlling how much history feeds aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DAY_SECS: i64 = 86_400;

/// How many historical matches to request per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MatchCount {
    #[serde(rename = "10")]
    Ten,
    #[default]
    #[serde(rename = "20")]
    Twenty,
    #[serde(rename = "50")]
    Fifty,
    #[serde(rename = "100")]
    Hundred,
}

impl MatchCount {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "10" => Some(MatchCount::Ten),
            "20" => Some(MatchCount::Twenty),
            "50" => Some(MatchCount::Fifty),
            "100" => Some(MatchCount::Hundred),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCount::Ten => "10",
            MatchCount::Twenty => "20",
            MatchCount::Fifty => "50",
            MatchCount::Hundred => "100",
        }
    }

    pub fn limit(&self) -> u32 {
        match self {
            MatchCount::Ten => 10,
            MatchCount::Twenty => 20,
            MatchCount::Fifty => 50,
            MatchCount::Hundred => 100,
        }
    }
}

/// Minimum number of current roster members that must have played a
/// historical match together for it to count toward team aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerMin {
    #[default]
    Any,
    Min2,
    Min3,
    Min4,
    All,
}

impl PlayerMin {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ANY" => Some(PlayerMin::Any),
            "MIN2" => Some(PlayerMin::Min2),
            "MIN3" => Some(PlayerMin::Min3),
            "MIN4" => Some(PlayerMin::Min4),
            "ALL" => Some(PlayerMin::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerMin::Any => "ANY",
            PlayerMin::Min2 => "MIN2",
            PlayerMin::Min3 => "MIN3",
            PlayerMin::Min4 => "MIN4",
            PlayerMin::All => "ALL",
        }
    }

    /// Required overlap for a roster of `roster_size` players.
    pub fn threshold(&self, roster_size: usize) -> usize {
        let wanted = match self {
            PlayerMin::Any => 1,
            PlayerMin::Min2 => 2,
            PlayerMin::Min3 => 3,
            PlayerMin::Min4 => 4,
            PlayerMin::All => roster_size,
        };
        wanted.clamp(1, roster_size.max(1))
    }
}

/// How far back history is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeSpan {
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "2W")]
    TwoWeeks,
    #[serde(rename = "1M")]
    OneMonth,
    #[default]
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
}

impl TimeSpan {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1W" => Some(TimeSpan::OneWeek),
            "2W" => Some(TimeSpan::TwoWeeks),
            "1M" => Some(TimeSpan::OneMonth),
            "3M" => Some(TimeSpan::ThreeMonths),
            "6M" => Some(TimeSpan::SixMonths),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSpan::OneWeek => "1W",
            TimeSpan::TwoWeeks => "2W",
            TimeSpan::OneMonth => "1M",
            TimeSpan::ThreeMonths => "3M",
            TimeSpan::SixMonths => "6M",
        }
    }

    /// Span length in seconds. A month counts as 30 days.
    pub fn seconds(&self) -> i64 {
        match self {
            TimeSpan::OneWeek => 7 * DAY_SECS,
            TimeSpan::TwoWeeks => 14 * DAY_SECS,
            TimeSpan::OneMonth => 30 * DAY_SECS,
            TimeSpan::ThreeMonths => 90 * DAY_SECS,
            TimeSpan::SixMonths => 180 * DAY_SECS,
        }
    }
}

/// User-selected history filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RangeOptions {
    pub match_count: MatchCount,
    pub player_min: PlayerMin,
    pub time_span: TimeSpan,
}

impl RangeOptions {
    /// Build from raw stored strings, falling back per field when a value is
    /// not recognised.
    pub fn from_raw(match_count: &str, player_min: &str, time_span: &str) -> Self {
        Self {
            match_count: MatchCount::parse(match_count).unwrap_or(MatchCount::Hundred),
            player_min: PlayerMin::parse(player_min).unwrap_or(PlayerMin::Any),
            time_span: TimeSpan::parse(time_span).unwrap_or(TimeSpan::SixMonths),
        }
    }

    pub fn count_window(&self) -> (u32, u32) {
        (0, self.match_count.limit())
    }

    pub fn time_window(&self, now: DateTime<Utc>) -> (i64, i64) {
        let to = now.timestamp();
        (to - self.time_span.seconds(), to)
    }
}

/// Decode a raw match-count value into an `(offset, limit)` pair.
pub fn count_window(raw: &str) -> (u32, u32) {
    let count = MatchCount::parse(raw).unwrap_or(MatchCount::Hundred);
    (0, count.limit())
}

/// Decode a raw time-span value into a `[from, to]` Unix-second pair.
pub fn time_window(raw: &str, now: DateTime<Utc>) -> (i64, i64) {
    let span = TimeSpan::parse(raw).unwrap_or(TimeSpan::SixMonths);
    let to = now.timestamp();
    (to - span.seconds(), to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_window() {
        assert_eq!(count_window("50"), (0, 50));
        assert_eq!(count_window("10"), (0, 10));
        assert_eq!(count_window("7"), (0, 100));
        assert_eq!(count_window(""), (0, 100));
    }

    #[test]
    fn test_time_window() {
        let now = Utc::now();
        let (from, to) = time_window("1W", now);
        assert_eq!(to, now.timestamp());
        assert!((to - from - 604_800).abs() <= 1);

        let (from, to) = time_window("bogus", now);
        assert!((to - from - 15_552_000).abs() <= 1);
    }

    #[test]
    fn test_player_min_threshold() {
        assert_eq!(PlayerMin::Any.threshold(5), 1);
        assert_eq!(PlayerMin::Min3.threshold(5), 3);
        assert_eq!(PlayerMin::All.threshold(5), 5);
        assert_eq!(PlayerMin::Min4.threshold(2), 2);
        assert_eq!(PlayerMin::All.threshold(0), 1);
    }

    #[test]
    fn test_from_raw_fallbacks() {
        let options = RangeOptions::from_raw("x", "y", "z");
        assert_eq!(options.match_count, MatchCount::Hundred);
        assert_eq!(options.player_min, PlayerMin::Any);
        assert_eq!(options.time_span, TimeSpan::SixMonths);
    }

    #[test]
    fn test_serialization_uses_wire_strings() {
        let options = RangeOptions {
            match_count: MatchCount::Fifty,
            player_min: PlayerMin::Min2,
            time_span: TimeSpan::OneWeek,
        };
        let json = serde_json::to_value(options).unwrap();
        assert_eq!(json["matchCount"], "50");
        assert_eq!(json["playerMin"], "MIN2");
        assert_eq!(json["timeSpan"], "1W");
    }
}
