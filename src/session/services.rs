use std::sync::Arc;

use crate::db::Database;
use crate::models::DailyStats;
use crate::notify::{Notification, NotificationSink};
use crate::sync::RemoteSync;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// Collaborators the session loops write through. Every one of them is always
/// present; unauthenticated sessions get a no-op remote store.
#[derive(Clone)]
pub struct SessionServices {
    pub db: Database,
    pub remote: RemoteSync,
    pub notifier: Arc<dyn NotificationSink>,
}

impl SessionServices {
    pub fn new(db: Database, remote: RemoteSync, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            db,
            remote,
            notifier,
        }
    }

    /// Stats to resume `date_key` from: local and remote snapshots merged, or
    /// a zeroed day when neither exists.
    pub async fn load_stats(&self, date_key: &str) -> DailyStats {
        let local = match self.db.load_daily_stats(date_key).await {
            Ok(stats) => stats,
            Err(err) => {
                log_warn!("failed to load local stats for {date_key}: {err:#}");
                None
            }
        };
        let remote = self.remote.fetch(date_key).await;

        let mut stats = match (local, remote) {
            (Some(local), Some(remote)) => local.merge_max(&remote),
            (Some(stats), None) | (None, Some(stats)) => stats,
            (None, None) => DailyStats::empty(date_key),
        };
        stats.date_key = date_key.to_string();
        stats
    }

    /// Local write now, remote push on the next sync interval. Failures are
    /// logged and never reach the caller.
    pub async fn persist(&self, stats: DailyStats) {
        if let Err(err) = self.db.save_daily_stats(&stats).await {
            log_error!("failed to save stats for {}: {err:#}", stats.date_key);
        }
        self.remote.queue(stats).await;
    }

    pub fn notify(&self, notification: Notification) {
        self.notifier.notify(notification);
    }
}
