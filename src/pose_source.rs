//! Boundary to the pose-estimation model.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::models::PoseFrame;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Frames older than this are treated as no detection.
const STALE_FRAME_MS: i64 = 1_000;

pub trait PoseSource: Send {
    /// Most recent frame, or `None` if nothing has been produced yet.
    fn latest(&mut self) -> Result<Option<PoseFrame>>;
}

/// Producer half: whoever runs the model publishes frames here.
#[derive(Clone)]
pub struct PoseFeed {
    tx: watch::Sender<Option<PoseFrame>>,
}

impl PoseFeed {
    pub fn publish(&self, frame: PoseFrame) {
        self.tx.send_replace(Some(frame));
    }
}

pub struct WatchPoseSource {
    rx: watch::Receiver<Option<PoseFrame>>,
}

impl PoseSource for WatchPoseSource {
    fn latest(&mut self) -> Result<Option<PoseFrame>> {
        if self.rx.has_changed().is_err() {
            bail!("pose feed closed");
        }
        Ok(self.rx.borrow_and_update().clone())
    }
}

pub fn pose_channel() -> (PoseFeed, WatchPoseSource) {
    let (tx, rx) = watch::channel(None);
    (PoseFeed { tx }, WatchPoseSource { rx })
}

/// Reads the current frame, degrading failures and stale data to an empty
/// frame so the classifier reports `Unknown` rather than erroring.
pub fn read_frame(source: &mut dyn PoseSource, now: DateTime<Utc>) -> PoseFrame {
    match source.latest() {
        Ok(Some(frame)) if now - frame.captured_at <= Duration::milliseconds(STALE_FRAME_MS) => {
            frame
        }
        Ok(_) => PoseFrame::empty(now),
        Err(err) => {
            log_warn!("pose estimation unavailable: {err:#}");
            PoseFrame::empty(now)
        }
    }
}
