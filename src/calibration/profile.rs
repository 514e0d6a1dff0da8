use serde::{Deserialize, Serialize};

pub const MIN_MULTIPLIER: f32 = 0.4;
pub const MAX_MULTIPLIER: f32 = 0.8;

/// NaN falls back to the lower bound.
pub fn clamp_multiplier(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_MULTIPLIER;
    }
    value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

/// A completed calibration. Never mutated in place; a new multiplier or a new
/// calibration run produces a fresh profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub upright_offset: f32,
    pub relaxed_offset: f32,
    pub shoulder_span: f32,
    pub threshold_multiplier: f32,
    pub threshold_px: f32,
}

impl CalibrationProfile {
    pub fn new(
        upright_offset: f32,
        relaxed_offset: f32,
        shoulder_span: f32,
        threshold_multiplier: f32,
    ) -> Self {
        let threshold_multiplier = clamp_multiplier(threshold_multiplier);
        let threshold_px = ((relaxed_offset - upright_offset).abs() * threshold_multiplier).round();

        Self {
            upright_offset,
            relaxed_offset,
            shoulder_span,
            threshold_multiplier,
            threshold_px,
        }
    }

    pub fn with_multiplier(&self, threshold_multiplier: f32) -> Self {
        Self::new(
            self.upright_offset,
            self.relaxed_offset,
            self.shoulder_span,
            threshold_multiplier,
        )
    }
}
