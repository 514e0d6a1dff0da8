use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::{sync::Mutex, task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::breaks::BreakEvent;
use crate::calibration::{CalibrationProfile, CalibrationStage};
use crate::db::Database;
use crate::models::daily_stats::format_short;
use crate::models::{date_key, DailyStats, PoseFrame};
use crate::notify::NotificationSink;
use crate::pose_source::{read_frame, PoseSource};
use crate::settings::SettingsStore;
use crate::sync::RemoteSync;

use super::context::{SessionContext, SessionSnapshot};
use super::loop_worker::{
    background_loop, frame_loop, report_break_event, SharedContext, SharedPoseSource,
};
use super::services::SessionServices;

struct ActiveSession {
    context: SharedContext,
    cancel_token: CancellationToken,
    frame_handle: JoinHandle<()>,
    background_handle: JoinHandle<()>,
}

/// Owns the live session and its two loops. Cheap to clone; every clone
/// drives the same session.
#[derive(Clone)]
pub struct SessionController {
    services: SessionServices,
    settings: Arc<SettingsStore>,
    source: SharedPoseSource,
    active: Arc<Mutex<Option<ActiveSession>>>,
}

impl SessionController {
    pub fn new(
        db: Database,
        settings: Arc<SettingsStore>,
        remote: RemoteSync,
        notifier: Arc<dyn NotificationSink>,
        source: Box<dyn PoseSource>,
    ) -> Self {
        Self {
            services: SessionServices::new(db, remote, notifier),
            settings,
            source: Arc::new(Mutex::new(source)),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Seeds today's stats and spawns the frame and background loops.
    /// Tracking begins once calibration completes.
    pub async fn start_session(&self) -> Result<SessionSnapshot> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            bail!("session already active");
        }

        let now = Utc::now();
        let settings = self.settings.current();
        let stats = self.services.load_stats(&date_key(now)).await;
        info!(
            "session started for {} (total={}ms alerts={})",
            stats.date_key, stats.total_ms, stats.alert_count
        );

        let context: SharedContext = Arc::new(Mutex::new(SessionContext::new(&settings, stats, now)));
        let cancel_token = CancellationToken::new();

        let frame_handle = tokio::spawn(frame_loop(
            context.clone(),
            self.services.clone(),
            self.source.clone(),
            Duration::from_millis(settings.frame_interval_ms.max(1)),
            cancel_token.clone(),
        ));
        let background_handle = tokio::spawn(background_loop(
            context.clone(),
            self.services.clone(),
            Duration::from_millis(settings.background_interval_ms.max(1)),
            cancel_token.clone(),
        ));

        let snapshot = context.lock().await.snapshot(now);
        *active = Some(ActiveSession {
            context,
            cancel_token,
            frame_handle,
            background_handle,
        });
        Ok(snapshot)
    }

    /// Cancels both loops, waits for them, then writes the final stats
    /// locally and flushes anything pending to the remote store.
    pub async fn stop_session(&self) -> Result<DailyStats> {
        let Some(session) = self.active.lock().await.take() else {
            bail!("no active session to stop");
        };

        session.cancel_token.cancel();
        session
            .frame_handle
            .await
            .context("frame loop task failed to join")?;
        session
            .background_handle
            .await
            .context("background loop task failed to join")?;

        let stats = session.context.lock().await.stats().clone();
        self.services
            .db
            .save_daily_stats(&stats)
            .await
            .context("failed to save final session stats")?;
        self.services.remote.queue(stats.clone()).await;
        self.services.remote.flush(Utc::now()).await;

        info!(
            "session stopped: tracked {} (good {}, bad {}), {} alerts",
            format_short(stats.total_ms),
            format_short(stats.good_ms),
            format_short(stats.bad_ms),
            stats.alert_count
        );
        Ok(stats)
    }

    pub async fn start_calibration(&self) -> Result<CalibrationStage> {
        let context = self.context().await?;
        let mut guard = context.lock().await;
        guard.start_calibration();
        Ok(guard.calibration_stage())
    }

    pub async fn confirm_upright(&self) -> Result<CalibrationStage> {
        let context = self.context().await?;
        let frame = self.current_frame().await;
        let mut guard = context.lock().await;
        guard.confirm_upright(&frame)?;
        Ok(guard.calibration_stage())
    }

    pub async fn confirm_relaxed(&self) -> Result<CalibrationProfile> {
        let context = self.context().await?;
        let frame = self.current_frame().await;
        let profile = context.lock().await.confirm_relaxed(&frame, Utc::now())?;
        Ok(profile)
    }

    /// Persists the clamped multiplier and applies it to the live threshold.
    /// Works with or without a running session.
    pub async fn set_threshold_multiplier(&self, multiplier: f32) -> Result<f32> {
        let kept = self.settings.update_threshold_multiplier(multiplier)?;
        if let Some(session) = self.active.lock().await.as_ref() {
            session.context.lock().await.set_threshold_multiplier(kept);
        }
        info!("threshold multiplier set to {kept:.2}");
        Ok(kept)
    }

    /// Ends the running break early. Returns false if there was none.
    pub async fn dismiss_break(&self) -> Result<bool> {
        let context = self.context().await?;
        let outcome = context.lock().await.dismiss_break(Utc::now());
        report_break_event(&self.services, &outcome.event);
        Ok(outcome.event != BreakEvent::Idle)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let context = self.context().await?;
        let snapshot = context.lock().await.snapshot(Utc::now());
        Ok(snapshot)
    }

    async fn context(&self) -> Result<SharedContext> {
        match self.active.lock().await.as_ref() {
            Some(session) => Ok(session.context.clone()),
            None => bail!("no active session; run `start` first"),
        }
    }

    async fn current_frame(&self) -> PoseFrame {
        let now = Utc::now();
        let mut source = self.source.lock().await;
        let frame = read_frame(source.as_mut(), now);
        if frame.poses.is_empty() {
            warn!("no fresh pose available for calibration");
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::fixtures::frame_with_offset;
    use crate::notify::recording::RecordingNotifier;
    use crate::pose_source::{pose_channel, PoseFeed};
    use crate::sync::MemoryRemoteStore;

    struct Harness {
        controller: SessionController,
        feed: PoseFeed,
        db: Database,
        remote: Arc<MemoryRemoteStore>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("posturewatch.sqlite3")).unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let remote = Arc::new(MemoryRemoteStore::default());
        let sync = RemoteSync::new(remote.clone(), "subject", chrono::Duration::seconds(60));
        let (feed, source) = pose_channel();
        let controller = SessionController::new(
            db.clone(),
            settings,
            sync,
            Arc::new(RecordingNotifier::default()),
            Box::new(source),
        );
        Harness {
            controller,
            feed,
            db,
            remote,
            _dir: dir,
        }
    }

    async fn calibrate(h: &Harness) -> CalibrationProfile {
        h.controller.start_calibration().await.unwrap();
        h.feed.publish(frame_with_offset(-50.0, 160.0, Utc::now()));
        h.controller.confirm_upright().await.unwrap();
        h.feed.publish(frame_with_offset(-20.0, 160.0, Utc::now()));
        h.controller.confirm_relaxed().await.unwrap()
    }

    #[tokio::test]
    async fn commands_need_a_running_session() {
        let h = harness();
        assert!(h.controller.snapshot().await.is_err());
        assert!(h.controller.start_calibration().await.is_err());
        assert!(h.controller.stop_session().await.is_err());

        h.controller.start_session().await.unwrap();
        assert!(h.controller.start_session().await.is_err());
        h.controller.stop_session().await.unwrap();
        assert!(!h.controller.is_active().await);
    }

    #[tokio::test]
    async fn session_is_seeded_from_local_and_remote() {
        let h = harness();
        let today = date_key(Utc::now());
        h.db
            .save_daily_stats(&DailyStats {
                total_ms: 5_000,
                good_ms: 4_000,
                longest_good_streak_ms: 9_000,
                ..DailyStats::empty(today.clone())
            })
            .await
            .unwrap();
        h.remote.insert(
            "subject",
            DailyStats {
                total_ms: 8_000,
                good_ms: 6_000,
                longest_good_streak_ms: 2_000,
                alert_count: 3,
                ..DailyStats::empty(today.clone())
            },
        );

        let snapshot = h.controller.start_session().await.unwrap();
        assert_eq!(snapshot.stats.total_ms, 8_000);
        assert_eq!(snapshot.stats.good_ms, 6_000);
        assert_eq!(snapshot.stats.longest_good_streak_ms, 9_000);
        assert_eq!(snapshot.stats.alert_count, 3);
        h.controller.stop_session().await.unwrap();
    }

    #[tokio::test]
    async fn calibration_failure_leaves_stage_unchanged() {
        let h = harness();
        h.controller.start_session().await.unwrap();
        h.controller.start_calibration().await.unwrap();

        // Nothing published yet.
        let err = h.controller.confirm_upright().await.unwrap_err();
        assert!(err.to_string().contains("no pose detected"));
        assert_eq!(
            h.controller.snapshot().await.unwrap().calibration_stage,
            CalibrationStage::AwaitingUpright
        );
        h.controller.stop_session().await.unwrap();
    }

    #[tokio::test]
    async fn tracked_session_persists_and_flushes_on_stop() {
        let h = harness();
        h.controller.start_session().await.unwrap();
        assert_eq!(calibrate(&h).await.threshold_px, 12.0);

        h.feed.publish(frame_with_offset(-50.0, 160.0, Utc::now()));
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let stats = h.controller.stop_session().await.unwrap();
        assert!(stats.good_ms > 0);
        assert!(stats.good_ms + stats.bad_ms <= stats.total_ms);

        let stored = h.db.load_daily_stats(&stats.date_key).await.unwrap().unwrap();
        assert_eq!(stored, stats);
        assert_eq!(h.remote.get("subject", &stats.date_key), Some(stats));
    }

    #[tokio::test]
    async fn multiplier_is_clamped_and_applied_live() {
        let h = harness();
        assert_eq!(h.controller.set_threshold_multiplier(0.1).await.unwrap(), 0.4);

        h.controller.start_session().await.unwrap();
        calibrate(&h).await;
        assert_eq!(h.controller.set_threshold_multiplier(0.6).await.unwrap(), 0.6);
        assert_eq!(h.controller.snapshot().await.unwrap().threshold_px, Some(18.0));
        assert!(!h.controller.dismiss_break().await.unwrap());
        h.controller.stop_session().await.unwrap();
    }
}
