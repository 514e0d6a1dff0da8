use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::models::{PoseFrame, UpperBody};

use super::profile::{clamp_multiplier, CalibrationProfile};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationStage {
    NotStarted,
    AwaitingUpright,
    AwaitingRelaxed,
    Calibrated,
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no pose detected; make sure your upper body is visible")]
    PoseNotDetected,
    #[error("nose and shoulders not detected clearly; adjust your position")]
    KeypointsMissing,
    #[error("cannot confirm this pose while calibration is {0:?}")]
    OutOfSequence(CalibrationStage),
}

#[derive(Debug, Clone, Copy)]
struct UprightReading {
    offset: f32,
    shoulder_span: f32,
}

/// Drives the upright → relaxed calibration protocol.
///
/// The active profile is only ever swapped as a whole: starting a new run
/// drops it, finishing a run installs the replacement.
#[derive(Debug)]
pub struct CalibrationManager {
    stage: CalibrationStage,
    upright: Option<UprightReading>,
    profile: Option<CalibrationProfile>,
    threshold_multiplier: f32,
}

impl CalibrationManager {
    pub fn new(threshold_multiplier: f32) -> Self {
        Self {
            stage: CalibrationStage::NotStarted,
            upright: None,
            profile: None,
            threshold_multiplier: clamp_multiplier(threshold_multiplier),
        }
    }

    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.profile.is_some()
    }

    pub fn threshold_multiplier(&self) -> f32 {
        self.threshold_multiplier
    }

    pub fn start(&mut self) {
        self.profile = None;
        self.upright = None;
        self.stage = CalibrationStage::AwaitingUpright;
        info!("calibration started; awaiting upright pose");
    }

    pub fn confirm_upright(&mut self, frame: &PoseFrame) -> Result<(), CalibrationError> {
        if self.stage != CalibrationStage::AwaitingUpright {
            return Err(CalibrationError::OutOfSequence(self.stage));
        }
        let body = read_upper_body(frame)?;

        self.upright = Some(UprightReading {
            offset: body.nose_shoulder_offset(),
            shoulder_span: body.shoulder_span(),
        });
        self.stage = CalibrationStage::AwaitingRelaxed;
        info!(
            "upright pose recorded (offset={:.1}px span={:.1}px); awaiting relaxed pose",
            body.nose_shoulder_offset(),
            body.shoulder_span()
        );
        Ok(())
    }

    pub fn confirm_relaxed(
        &mut self,
        frame: &PoseFrame,
    ) -> Result<CalibrationProfile, CalibrationError> {
        let upright = match (self.stage, self.upright) {
            (CalibrationStage::AwaitingRelaxed, Some(upright)) => upright,
            _ => return Err(CalibrationError::OutOfSequence(self.stage)),
        };
        let body = read_upper_body(frame)?;

        let profile = CalibrationProfile::new(
            upright.offset,
            body.nose_shoulder_offset(),
            upright.shoulder_span,
            self.threshold_multiplier,
        );
        self.profile = Some(profile.clone());
        self.upright = None;
        self.stage = CalibrationStage::Calibrated;
        info!(
            "calibration complete: upright={:.1}px relaxed={:.1}px threshold={}px",
            profile.upright_offset, profile.relaxed_offset, profile.threshold_px
        );
        Ok(profile)
    }

    /// Stores the clamped multiplier and re-derives the live threshold, if any.
    pub fn set_threshold_multiplier(&mut self, multiplier: f32) -> f32 {
        self.threshold_multiplier = clamp_multiplier(multiplier);
        if let Some(profile) = self.profile.as_ref() {
            self.profile = Some(profile.with_multiplier(self.threshold_multiplier));
        }
        self.threshold_multiplier
    }
}

fn read_upper_body(frame: &PoseFrame) -> Result<UpperBody, CalibrationError> {
    let pose = frame.primary().ok_or(CalibrationError::PoseNotDetected)?;
    pose.upper_body().ok_or(CalibrationError::KeypointsMissing)
}
