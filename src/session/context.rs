//! All mutable posture state for one live session.
//!
//! Both session loops go through this type under a single lock, so a frame
//! tick (classify, account, count the alert) always completes before the
//! background tick can observe or change the break state, and vice versa.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::breaks::{BreakEvent, BreakScheduler};
use crate::calibration::{CalibrationError, CalibrationManager, CalibrationProfile, CalibrationStage};
use crate::models::{BreakSession, DailyStats, PoseFrame, PostureState};
use crate::posture::{Classification, PostureClassifier};
use crate::settings::PostureSettings;
use crate::stats::SessionStatsTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub classification: Classification,
    pub stats_changed: bool,
    pub alert: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakOutcome {
    pub event: BreakEvent,
    pub stats_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub calibration_stage: CalibrationStage,
    pub threshold_multiplier: f32,
    pub threshold_px: Option<f32>,
    pub posture: PostureState,
    pub offset_change: Option<f32>,
    pub bad_elapsed_ms: Option<u64>,
    pub stats: DailyStats,
    pub quality_pct: f64,
    pub feedback: &'static str,
    pub active_break: Option<BreakSession>,
    pub break_remaining_ms: Option<i64>,
    pub next_checkpoint_ms: Option<i64>,
    pub alerts_in_window: u32,
}

#[derive(Debug)]
pub struct SessionContext {
    calibration: CalibrationManager,
    classifier: PostureClassifier,
    tracker: SessionStatsTracker,
    scheduler: BreakScheduler,
    last_classification: Option<Classification>,
}

impl SessionContext {
    pub fn new(settings: &PostureSettings, stats: DailyStats, now: DateTime<Utc>) -> Self {
        Self {
            calibration: CalibrationManager::new(settings.threshold_multiplier),
            classifier: PostureClassifier::new(settings.classifier_config()),
            tracker: SessionStatsTracker::new(stats),
            scheduler: BreakScheduler::new(settings.scheduler_config(), now),
            last_classification: None,
        }
    }

    pub fn stats(&self) -> &DailyStats {
        self.tracker.stats()
    }

    pub fn calibration_stage(&self) -> CalibrationStage {
        self.calibration.stage()
    }

    pub fn is_on_break(&self) -> bool {
        self.scheduler.is_on_break()
    }

    /// Frames only count while calibrated and not on a break.
    pub fn is_tracking(&self) -> bool {
        self.calibration.is_calibrated() && !self.scheduler.is_on_break()
    }

    /// Classify, account, then count the alert edge, in that order.
    pub fn frame_tick(&mut self, frame: &PoseFrame, now: DateTime<Utc>) -> Option<FrameOutcome> {
        if self.scheduler.is_on_break() {
            return None;
        }
        let profile = self.calibration.profile()?;

        let classification = self.classifier.tick(frame, profile, now);
        let outcome = self.tracker.record(&classification, now);
        if outcome.alert_counted {
            self.scheduler.record_alert();
        }
        self.last_classification = Some(classification);

        Some(FrameOutcome {
            classification,
            stats_changed: outcome.changed,
            alert: outcome.alert_counted,
        })
    }

    /// Checkpoint evaluation and break expiry.
    pub fn background_tick(&mut self, now: DateTime<Utc>) -> BreakOutcome {
        let event = self.scheduler.tick(now);
        self.apply_break_event(event, now)
    }

    pub fn dismiss_break(&mut self, now: DateTime<Utc>) -> BreakOutcome {
        let event = self.scheduler.dismiss(now);
        self.apply_break_event(event, now)
    }

    pub fn start_calibration(&mut self) {
        self.calibration.start();
        self.scheduler.disarm();
        self.classifier.reset();
        self.tracker.resume();
        self.last_classification = None;
    }

    pub fn confirm_upright(&mut self, frame: &PoseFrame) -> Result<(), CalibrationError> {
        self.calibration.confirm_upright(frame)
    }

    pub fn confirm_relaxed(
        &mut self,
        frame: &PoseFrame,
        now: DateTime<Utc>,
    ) -> Result<CalibrationProfile, CalibrationError> {
        let profile = self.calibration.confirm_relaxed(frame)?;
        self.classifier.reset();
        self.tracker.resume();
        self.scheduler.arm(now);
        Ok(profile)
    }

    pub fn set_threshold_multiplier(&mut self, multiplier: f32) -> f32 {
        self.calibration.set_threshold_multiplier(multiplier)
    }

    pub fn rollover_due(&self, now: DateTime<Utc>) -> Option<String> {
        self.tracker.rollover_due(now)
    }

    /// Installs the new day's stats and returns the finished day.
    pub fn roll_over(&mut self, stats: DailyStats, now: DateTime<Utc>) -> DailyStats {
        self.tracker.roll_over(stats, now)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let stats = self.tracker.stats().clone();
        let last = self.last_classification.filter(|_| self.is_tracking());
        let active_break = self.scheduler.active_break().cloned();

        SessionSnapshot {
            calibration_stage: self.calibration.stage(),
            threshold_multiplier: self.calibration.threshold_multiplier(),
            threshold_px: self.calibration.profile().map(|p| p.threshold_px),
            posture: last.map_or(PostureState::Unknown, |c| c.state),
            offset_change: last.and_then(|c| c.offset_change),
            bad_elapsed_ms: self.classifier.bad_elapsed_ms(now),
            quality_pct: stats.quality_pct(),
            feedback: stats.discipline_feedback(),
            stats,
            break_remaining_ms: active_break
                .as_ref()
                .map(|session| session.remaining(now).num_milliseconds()),
            active_break,
            next_checkpoint_ms: self
                .scheduler
                .time_until_checkpoint(now)
                .map(|remaining| remaining.num_milliseconds()),
            alerts_in_window: self.scheduler.window().alerts_in_window,
        }
    }

    fn apply_break_event(&mut self, event: BreakEvent, now: DateTime<Utc>) -> BreakOutcome {
        let stats_changed = match &event {
            BreakEvent::Started(_) => {
                self.classifier.reset();
                self.last_classification = None;
                self.tracker.suspend(now)
            }
            BreakEvent::Ended { .. } => {
                self.tracker.resume();
                false
            }
            BreakEvent::Idle => false,
        };
        BreakOutcome {
            event,
            stats_changed,
        }
    }
}
