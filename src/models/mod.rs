pub mod break_session;
pub mod daily_stats;
pub mod pose;
pub mod posture;

pub use break_session::{BreakEnd, BreakSession};
pub use daily_stats::{date_key, DailyStats};
pub use pose::{Keypoint, Pose, PoseFrame, UpperBody};
pub use posture::PostureState;
