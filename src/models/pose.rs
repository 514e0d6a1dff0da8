//! Pose-estimation data as delivered by the keypoint model.
//!
//! Coordinates are frame pixels with `y` growing downwards, so a head that
//! drops towards the shoulders makes `nose.y - shoulder_y` larger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Keypoints scoring below this are treated as not detected.
pub const MIN_KEYPOINT_SCORE: f32 = 0.3;

pub const NOSE: &str = "nose";
pub const LEFT_SHOULDER: &str = "left_shoulder";
pub const RIGHT_SHOULDER: &str = "right_shoulder";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Keypoint {
    pub fn new(name: impl Into<String>, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            score,
        }
    }

    fn is_confident(&self) -> bool {
        self.score >= MIN_KEYPOINT_SCORE
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn keypoint(&self, name: &str) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }

    /// Nose and both shoulders, provided each is present and confident.
    pub fn upper_body(&self) -> Option<UpperBody> {
        let nose = self.keypoint(NOSE).filter(|kp| kp.is_confident())?;
        let left = self.keypoint(LEFT_SHOULDER).filter(|kp| kp.is_confident())?;
        let right = self.keypoint(RIGHT_SHOULDER).filter(|kp| kp.is_confident())?;

        Some(UpperBody {
            nose_y: nose.y,
            left_shoulder: (left.x, left.y),
            right_shoulder: (right.x, right.y),
        })
    }
}

/// One tick of pose-estimation output. Only the first pose is ever used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseFrame {
    #[serde(default)]
    pub poses: Vec<Pose>,
    pub captured_at: DateTime<Utc>,
}

impl PoseFrame {
    pub fn new(poses: Vec<Pose>, captured_at: DateTime<Utc>) -> Self {
        Self { poses, captured_at }
    }

    /// A frame in which nothing was detected.
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            poses: Vec::new(),
            captured_at,
        }
    }

    pub fn primary(&self) -> Option<&Pose> {
        self.poses.first()
    }
}

/// The landmark geometry the posture model works from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpperBody {
    pub nose_y: f32,
    pub left_shoulder: (f32, f32),
    pub right_shoulder: (f32, f32),
}

impl UpperBody {
    /// Vertical distance from the average shoulder height to the nose.
    pub fn nose_shoulder_offset(&self) -> f32 {
        let shoulder_y = (self.left_shoulder.1 + self.right_shoulder.1) / 2.0;
        self.nose_y - shoulder_y
    }

    pub fn shoulder_span(&self) -> f32 {
        (self.left_shoulder.0 - self.right_shoulder.0).abs()
    }
}
