//! Line protocol for driving a session from stdin.
//!
//! A line holding a JSON object is a pose frame and goes to the pose feed.
//! Anything else is a command word: `start`, `stop`, `calibrate`, `upright`,
//! `relaxed`, `multiplier <value>`, `dismiss` or `status`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Pose, PoseFrame};
use crate::pose_source::PoseFeed;

use super::SessionController;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Frame(PoseFrame),
    Start,
    Stop,
    Calibrate,
    Upright,
    Relaxed,
    Multiplier(f32),
    Dismiss,
    Status,
}

/// Frames from the model may omit the capture time; they are stamped on read.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameLine {
    #[serde(default)]
    poses: Vec<Pose>,
    captured_at: Option<DateTime<Utc>>,
}

/// `Ok(None)` for blank lines.
pub fn parse_command(line: &str, now: DateTime<Utc>) -> Result<Option<SessionCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.starts_with('{') {
        let frame: FrameLine = serde_json::from_str(line).context("malformed pose frame")?;
        return Ok(Some(SessionCommand::Frame(PoseFrame::new(
            frame.poses,
            frame.captured_at.unwrap_or(now),
        ))));
    }

    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next()) {
        (Some("start"), None) => SessionCommand::Start,
        (Some("stop"), None) => SessionCommand::Stop,
        (Some("calibrate"), None) => SessionCommand::Calibrate,
        (Some("upright"), None) => SessionCommand::Upright,
        (Some("relaxed"), None) => SessionCommand::Relaxed,
        (Some("dismiss"), None) => SessionCommand::Dismiss,
        (Some("status"), None) => SessionCommand::Status,
        (Some("multiplier"), Some(value)) => {
            let value: f32 = value
                .parse()
                .map_err(|_| anyhow!("multiplier must be a number, got `{value}`"))?;
            SessionCommand::Multiplier(value)
        }
        (Some("multiplier"), None) => bail!("usage: multiplier <0.4-0.8>"),
        _ => bail!("unknown command `{line}`"),
    };

    if words.next().is_some() {
        bail!("unexpected arguments in `{line}`");
    }
    Ok(Some(command))
}

/// Runs one command. The returned text is what the driver prints; frames
/// produce no output.
pub async fn handle_command(
    controller: &SessionController,
    feed: &PoseFeed,
    command: SessionCommand,
) -> Result<Option<String>, String> {
    let reply = match command {
        SessionCommand::Frame(frame) => {
            feed.publish(frame);
            return Ok(None);
        }
        SessionCommand::Start => controller
            .start_session()
            .await
            .and_then(to_json)
            .map_err(|e| e.to_string())?,
        SessionCommand::Stop => controller
            .stop_session()
            .await
            .and_then(to_json)
            .map_err(|e| e.to_string())?,
        SessionCommand::Calibrate => controller
            .start_calibration()
            .await
            .map(|_| "calibration started: sit upright, then send `upright`".to_string())
            .map_err(|e| e.to_string())?,
        SessionCommand::Upright => controller
            .confirm_upright()
            .await
            .map(|_| "upright pose recorded: relax your posture, then send `relaxed`".to_string())
            .map_err(|e| e.to_string())?,
        SessionCommand::Relaxed => controller
            .confirm_relaxed()
            .await
            .and_then(to_json)
            .map_err(|e| e.to_string())?,
        SessionCommand::Multiplier(value) => controller
            .set_threshold_multiplier(value)
            .await
            .map(|kept| format!("threshold multiplier {kept:.2}"))
            .map_err(|e| e.to_string())?,
        SessionCommand::Dismiss => controller
            .dismiss_break()
            .await
            .map(|ended| {
                if ended {
                    "break dismissed".to_string()
                } else {
                    "no break in progress".to_string()
                }
            })
            .map_err(|e| e.to_string())?,
        SessionCommand::Status => controller
            .snapshot()
            .await
            .and_then(to_json)
            .map_err(|e| e.to_string())?,
    };
    Ok(Some(reply))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<String> {
    serde_json::to_string(&value).context("failed to serialize reply")
}
