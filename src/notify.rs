use log::info;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Notification {
    PostureAlert,
    BreakStarted { duration_minutes: u32, reason: String },
    BreakCompleted,
}

impl Notification {
    pub fn title(&self) -> String {
        match self {
            Notification::PostureAlert => "Posture Alert!".into(),
            Notification::BreakStarted {
                duration_minutes, ..
            } => {
                let plural = if *duration_minutes > 1 { "s" } else { "" };
                format!("Break Time: {duration_minutes} minute{plural}")
            }
            Notification::BreakCompleted => "Break Complete!".into(),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Notification::PostureAlert => "Please correct your posture and sit upright.",
            Notification::BreakStarted { reason, .. } if !reason.is_empty() => reason.as_str(),
            Notification::BreakStarted { .. } => "Stand up, stretch, and rest your eyes",
            Notification::BreakCompleted => "Time to resume tracking. Sit with good posture!",
        }
    }
}

/// Where user-facing notices go. Delivery must not block the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&self, _notification: Notification) {}
}

pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!("[notice] {}: {}", notification.title(), notification.body());
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }
}
