//! Two-stage calibration: the subject confirms an upright pose, then a
//! relaxed one, and the gap between the two sets their personal threshold.

mod manager;
mod profile;

pub use manager::{CalibrationError, CalibrationManager, CalibrationStage};
pub use profile::{clamp_multiplier, CalibrationProfile, MAX_MULTIPLIER, MIN_MULTIPLIER};
