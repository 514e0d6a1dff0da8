//! Per-frame posture classification with alert hysteresis.
//!
//! Each frame gets a raw `Good`/`Bad`/`Unknown` verdict from the head-drop
//! geometry. Alerting is layered on top: a bad-posture timer must run for
//! `bad_posture_duration_ms` before an alert fires, and only
//! `good_posture_required_ms` of uninterrupted non-bad frames clear it, so a
//! single noisy frame cannot restart the countdown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationProfile;
use crate::models::{PoseFrame, PostureState};

const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub bad_posture_duration_ms: u64,
    pub good_posture_required_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bad_posture_duration_ms: 15_000,
            good_posture_required_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Raw verdict for this frame; this is what time accounting uses.
    pub state: PostureState,
    /// True on exactly one frame per bad episode: the one where the bad timer
    /// first reaches `bad_posture_duration_ms`.
    pub alert_edge: bool,
    /// How long the current bad timer has been running, if armed.
    pub bad_elapsed_ms: Option<u64>,
    /// Head drop relative to the calibrated upright offset, in calibration pixels.
    pub offset_change: Option<f32>,
}

/// Raw verdict for one frame. Degraded input is `Unknown`, never an error.
pub fn classify_raw(frame: &PoseFrame, profile: &CalibrationProfile) -> (PostureState, Option<f32>) {
    let Some(body) = frame.primary().and_then(|pose| pose.upper_body()) else {
        return (PostureState::Unknown, None);
    };

    let mut normalized_offset = body.nose_shoulder_offset();
    if profile.shoulder_span > 0.0 {
        let current_span = body.shoulder_span();
        if current_span <= f32::EPSILON {
            return (PostureState::Unknown, None);
        }
        // Rescale to the distance the subject sat at during calibration.
        let distance_scale = current_span / profile.shoulder_span;
        normalized_offset /= distance_scale;
    }

    let offset_change = normalized_offset - profile.upright_offset;
    let state = if offset_change > profile.threshold_px {
        PostureState::Bad
    } else {
        PostureState::Good
    };
    (state, Some(offset_change))
}

#[derive(Debug, Clone)]
pub struct PostureClassifier {
    config: ClassifierConfig,
    bad_since: Option<DateTime<Utc>>,
    clear_since: Option<DateTime<Utc>>,
    alert_issued: bool,
}

impl PostureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            bad_since: None,
            clear_since: None,
            alert_issued: false,
        }
    }

    pub fn bad_elapsed_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.bad_since.map(|since| elapsed_ms(since, now))
    }

    /// Drops any running bad episode, e.g. when the session pauses for a break.
    pub fn reset(&mut self) {
        self.bad_since = None;
        self.clear_since = None;
        self.alert_issued = false;
    }

    pub fn tick(
        &mut self,
        frame: &PoseFrame,
        profile: &CalibrationProfile,
        now: DateTime<Utc>,
    ) -> Classification {
        let (state, offset_change) = classify_raw(frame, profile);

        let alert_edge = match state {
            PostureState::Bad => self.on_bad(now),
            PostureState::Good | PostureState::Unknown => {
                self.on_not_bad(now);
                false
            }
        };

        Classification {
            state,
            alert_edge,
            bad_elapsed_ms: self.bad_elapsed_ms(now),
            offset_change,
        }
    }

    fn on_bad(&mut self, now: DateTime<Utc>) -> bool {
        self.clear_since = None;
        let since = *self.bad_since.get_or_insert_with(|| {
            log_debug!("bad posture timer started");
            now
        });

        if self.alert_issued || elapsed_ms(since, now) < self.config.bad_posture_duration_ms {
            return false;
        }
        self.alert_issued = true;
        log_info!(
            "bad posture sustained for {}ms; raising alert",
            elapsed_ms(since, now)
        );
        true
    }

    fn on_not_bad(&mut self, now: DateTime<Utc>) {
        if self.bad_since.is_none() {
            self.clear_since = None;
            return;
        }

        let since = *self.clear_since.get_or_insert(now);
        if elapsed_ms(since, now) >= self.config.good_posture_required_ms {
            log_debug!("posture corrected; bad posture timer cleared");
            self.reset();
        }
    }
}

fn elapsed_ms(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - since).num_milliseconds().max(0) as u64
}
