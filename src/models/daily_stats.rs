//! Per-day posture totals.
//!
//! One `DailyStats` is live at a time; it is keyed by the calendar date in the
//! device's local timezone and rolled over when that date changes.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

pub fn date_key(now: DateTime<Utc>) -> String {
    now.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyStats {
    pub date_key: String,
    pub total_ms: u64,
    pub good_ms: u64,
    pub bad_ms: u64,
    pub longest_good_streak_ms: u64,
    pub alert_count: u32,
}

impl DailyStats {
    pub fn empty(date_key: impl Into<String>) -> Self {
        Self {
            date_key: date_key.into(),
            ..Self::default()
        }
    }

    /// Combines two snapshots of the same day.
    ///
    /// The time split comes from whichever snapshot has seen more time, so
    /// `good_ms + bad_ms <= total_ms` survives the merge. Streak and alert
    /// count only grow within a day and take the larger value.
    pub fn merge_max(&self, other: &DailyStats) -> DailyStats {
        let newest = if other.total_ms > self.total_ms { other } else { self };
        DailyStats {
            date_key: self.date_key.clone(),
            total_ms: newest.total_ms,
            good_ms: newest.good_ms,
            bad_ms: newest.bad_ms,
            longest_good_streak_ms: self
                .longest_good_streak_ms
                .max(other.longest_good_streak_ms),
            alert_count: self.alert_count.max(other.alert_count),
        }
    }

    pub fn unknown_ms(&self) -> u64 {
        self.total_ms.saturating_sub(self.good_ms + self.bad_ms)
    }

    /// Share of classified time spent in good posture, 0-100.
    pub fn quality_pct(&self) -> f64 {
        let classified = self.good_ms + self.bad_ms;
        if classified == 0 {
            return 0.0;
        }
        self.good_ms as f64 / classified as f64 * 100.0
    }

    pub fn discipline_feedback(&self) -> &'static str {
        match self.alert_count {
            0 => "Perfect discipline so far!",
            1..=4 => "Minor adjustments needed.",
            _ => "Take more frequent breaks.",
        }
    }
}

/// Compact duration: `0s`, `42s`, `7m`.
pub fn format_short(ms: u64) -> String {
    if ms < 1000 {
        return "0s".into();
    }
    let seconds = (ms as f64 / 1000.0).round() as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    format!("{}m", seconds / 60)
}

pub fn format_hms(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_ignores_unknown_time() {
        let stats = DailyStats {
            total_ms: 10_000,
            good_ms: 3_000,
            bad_ms: 1_000,
            ..DailyStats::empty("2026-03-01")
        };
        assert_eq!(stats.quality_pct(), 75.0);
        assert_eq!(stats.unknown_ms(), 6_000);
        assert_eq!(DailyStats::empty("2026-03-01").quality_pct(), 0.0);
    }

    #[test]
    fn merge_keeps_the_larger_streak() {
        let local = DailyStats {
            total_ms: 5_000,
            longest_good_streak_ms: 9_000,
            ..DailyStats::empty("2026-03-01")
        };
        let remote = DailyStats {
            total_ms: 7_000,
            longest_good_streak_ms: 4_000,
            alert_count: 2,
            ..DailyStats::empty("2026-03-01")
        };
        let merged = local.merge_max(&remote);
        assert_eq!(merged.total_ms, 7_000);
        assert_eq!(merged.date_key, "2026-03-01");
        assert_eq!(merged.longest_good_streak_ms, 9_000);
        assert_eq!(merged.alert_count, 2);
    }

    #[test]
    fn merge_takes_time_split_from_one_snapshot() {
        let local = DailyStats {
            total_ms: 90,
            good_ms: 30,
            bad_ms: 60,
            ..DailyStats::empty("2026-03-01")
        };
        let remote = DailyStats {
            total_ms: 100,
            good_ms: 80,
            bad_ms: 10,
            ..DailyStats::empty("2026-03-01")
        };
        let merged = local.merge_max(&remote);
        assert_eq!((merged.good_ms, merged.bad_ms), (80, 10));
        assert!(merged.good_ms + merged.bad_ms <= merged.total_ms);
    }

    #[test]
    fn feedback_tracks_alert_count() {
        let mut stats = DailyStats::empty("2026-03-01");
        assert_eq!(stats.discipline_feedback(), "Perfect discipline so far!");
        stats.alert_count = 4;
        assert_eq!(stats.discipline_feedback(), "Minor adjustments needed.");
        stats.alert_count = 5;
        assert_eq!(stats.discipline_feedback(), "Take more frequent breaks.");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_short(999), "0s");
        assert_eq!(format_short(42_400), "42s");
        assert_eq!(format_short(7 * 60_000 + 20_000), "7m");
        assert_eq!(format_hms(3_723_000), "01:02:03");
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let stats: DailyStats =
            serde_json::from_str(r#"{"dateKey":"2026-03-01","goodMs":12}"#).expect("valid json");
        assert_eq!(stats.good_ms, 12);
        assert_eq!(stats.total_ms, 0);
    }
}
