use chrono::{DateTime, Utc};
use log::info;

use crate::models::{date_key, DailyStats, PostureState};
use crate::posture::Classification;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Stats were mutated and should be written out.
    pub changed: bool,
    /// This tick carried the episode's alert edge and it was counted.
    pub alert_counted: bool,
}

/// Accumulates per-state time, good streaks and alerts for the live day.
#[derive(Debug, Clone)]
pub struct SessionStatsTracker {
    stats: DailyStats,
    last_tick: Option<DateTime<Utc>>,
    good_streak_start: Option<DateTime<Utc>>,
}

impl SessionStatsTracker {
    pub fn new(stats: DailyStats) -> Self {
        Self {
            stats,
            last_tick: None,
            good_streak_start: None,
        }
    }

    pub fn stats(&self) -> &DailyStats {
        &self.stats
    }

    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        self.last_tick
    }

    pub fn record(&mut self, classification: &Classification, now: DateTime<Utc>) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // The first tick after a start, break or rollover only anchors the clock.
        if let Some(last) = self.last_tick {
            let delta = elapsed_ms(last, now);
            self.stats.total_ms += delta;
            match classification.state {
                PostureState::Good => self.stats.good_ms += delta,
                PostureState::Bad => self.stats.bad_ms += delta,
                PostureState::Unknown => {}
            }
            outcome.changed = true;
        }
        self.last_tick = Some(now);

        if classification.state == PostureState::Good {
            let start = *self.good_streak_start.get_or_insert(now);
            outcome.changed |= self.observe_streak(start, now);
        } else if let Some(start) = self.good_streak_start.take() {
            outcome.changed |= self.observe_streak(start, now);
        }

        if classification.alert_edge {
            self.stats.alert_count += 1;
            outcome.alert_counted = true;
            outcome.changed = true;
        }

        outcome
    }

    /// Stops accrual (break start). Returns true if the streak finalisation
    /// changed the stats.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> bool {
        self.last_tick = None;
        match self.good_streak_start.take() {
            Some(start) => self.observe_streak(start, now),
            None => false,
        }
    }

    /// Re-arms accrual; the next tick anchors instead of charging the gap.
    pub fn resume(&mut self) {
        self.last_tick = None;
        self.good_streak_start = None;
    }

    /// The new date key if `now` falls on a different local day.
    pub fn rollover_due(&self, now: DateTime<Utc>) -> Option<String> {
        let key = date_key(now);
        (key != self.stats.date_key).then_some(key)
    }

    /// Swaps in the stats for a new day. The previous day's stats are returned
    /// untouched so they can be flushed under their own key.
    pub fn roll_over(&mut self, stats: DailyStats, now: DateTime<Utc>) -> DailyStats {
        info!(
            "day rollover: {} -> {}",
            self.stats.date_key, stats.date_key
        );
        let previous = std::mem::replace(&mut self.stats, stats);
        self.last_tick = None;
        if self.good_streak_start.is_some() {
            self.good_streak_start = Some(now);
        }
        previous
    }

    fn observe_streak(&mut self, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let streak = elapsed_ms(start, now);
        if streak > self.stats.longest_good_streak_ms {
            self.stats.longest_good_streak_ms = streak;
            return true;
        }
        false
    }
}

fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::milliseconds(ms)
    }

    fn tick(state: PostureState) -> Classification {
        Classification {
            state,
            alert_edge: false,
            bad_elapsed_ms: None,
            offset_change: None,
        }
    }

    fn tracker() -> SessionStatsTracker {
        SessionStatsTracker::new(DailyStats::empty(date_key(t(0))))
    }

    #[test]
    fn first_tick_only_anchors() {
        let mut tracker = tracker();
        let outcome = tracker.record(&tick(PostureState::Bad), t(0));
        assert!(!outcome.changed);
        assert_eq!(tracker.stats().total_ms, 0);
        assert_eq!(tracker.last_tick(), Some(t(0)));
    }

    #[test]
    fn time_is_split_by_state() {
        let mut tracker = tracker();
        tracker.record(&tick(PostureState::Good), t(0));
        tracker.record(&tick(PostureState::Good), t(100));
        tracker.record(&tick(PostureState::Bad), t(250));
        tracker.record(&tick(PostureState::Unknown), t(300));

        let stats = tracker.stats();
        assert_eq!(stats.total_ms, 300);
        assert_eq!(stats.good_ms, 100);
        assert_eq!(stats.bad_ms, 150);
        assert!(stats.good_ms + stats.bad_ms <= stats.total_ms);
    }

    #[test]
    fn longest_streak_updates_live_and_never_shrinks() {
        let mut tracker = tracker();
        tracker.record(&tick(PostureState::Good), t(0));
        tracker.record(&tick(PostureState::Good), t(5_000));
        assert_eq!(tracker.stats().longest_good_streak_ms, 5_000);

        tracker.record(&tick(PostureState::Bad), t(6_000));
        assert_eq!(tracker.stats().longest_good_streak_ms, 6_000);

        tracker.record(&tick(PostureState::Good), t(7_000));
        tracker.record(&tick(PostureState::Good), t(8_000));
        assert_eq!(tracker.stats().longest_good_streak_ms, 6_000);
    }

    #[test]
    fn alert_edge_counts_once() {
        let mut tracker = tracker();
        let mut alert = tick(PostureState::Bad);
        alert.alert_edge = true;

        tracker.record(&tick(PostureState::Bad), t(0));
        let outcome = tracker.record(&alert, t(50));
        assert!(outcome.alert_counted);
        let outcome = tracker.record(&tick(PostureState::Bad), t(100));
        assert!(!outcome.alert_counted);
        assert_eq!(tracker.stats().alert_count, 1);
    }

    #[test]
    fn suspended_gap_is_not_charged() {
        let mut tracker = tracker();
        tracker.record(&tick(PostureState::Good), t(0));
        tracker.record(&tick(PostureState::Good), t(1_000));
        tracker.suspend(t(1_000));
        assert_eq!(tracker.last_tick(), None);

        tracker.resume();
        tracker.record(&tick(PostureState::Good), t(600_000));
        tracker.record(&tick(PostureState::Good), t(600_050));
        assert_eq!(tracker.stats().total_ms, 1_050);
        assert_eq!(tracker.stats().longest_good_streak_ms, 1_000);
    }

    #[test]
    fn rollover_switches_to_new_day() {
        let mut tracker = tracker();
        tracker.record(&tick(PostureState::Good), t(0));
        tracker.record(&tick(PostureState::Good), t(1_000));

        let later = t(0) + Duration::hours(48);
        let key = tracker.rollover_due(later).expect("different day");
        assert!(tracker.rollover_due(t(2_000)).is_none());

        let previous = tracker.roll_over(DailyStats::empty(key.clone()), later);
        assert_eq!(previous.total_ms, 1_000);
        assert_eq!(tracker.stats().date_key, key);
        assert_eq!(tracker.last_tick(), None);

        tracker.record(&tick(PostureState::Good), later);
        tracker.record(&tick(PostureState::Good), later + Duration::milliseconds(500));
        assert_eq!(tracker.stats().total_ms, 500);
        assert_eq!(tracker.stats().longest_good_streak_ms, 500);
    }
}
