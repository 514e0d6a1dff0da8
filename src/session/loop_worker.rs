use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::breaks::BreakEvent;
use crate::models::BreakEnd;
use crate::notify::Notification;
use crate::pose_source::{read_frame, PoseSource};
use crate::sync::RemoteSync;

use super::context::SessionContext;
use super::services::SessionServices;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub type SharedContext = Arc<Mutex<SessionContext>>;
pub type SharedPoseSource = Arc<Mutex<Box<dyn PoseSource>>>;

/// ~20 Hz: read a frame, classify it, account for it. Overrunning ticks are
/// skipped rather than bunched up.
pub async fn frame_loop(
    context: SharedContext,
    services: SessionServices,
    source: SharedPoseSource,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                frame_tick(&context, &services, &source, Utc::now()).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("frame loop shutting down");
                break;
            }
        }
    }
}

/// ~1 Hz: checkpoints, break expiry and remote sync. Keeps running while a
/// break suspends the frame loop's accounting.
pub async fn background_loop(
    context: SharedContext,
    services: SessionServices,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sync_task: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                background_tick(&context, &services, now).await;
                spawn_sync_if_idle(&services.remote, &mut sync_task, now);
            }
            _ = cancel_token.cancelled() => {
                log_info!("background loop shutting down");
                break;
            }
        }
    }

    // The final flush on stop must not race an older in-flight batch.
    if let Some(task) = sync_task.take() {
        if let Err(err) = task.await {
            log_warn!("remote sync task failed: {err}");
        }
    }
}

async fn frame_tick(
    context: &SharedContext,
    services: &SessionServices,
    source: &SharedPoseSource,
    now: DateTime<Utc>,
) {
    if !context.lock().await.is_tracking() {
        return;
    }
    roll_over_if_due(context, services, now).await;

    let frame = {
        let mut source = source.lock().await;
        read_frame(source.as_mut(), now)
    };

    let outcome = {
        let mut guard = context.lock().await;
        let Some(outcome) = guard.frame_tick(&frame, now) else {
            return;
        };
        // Written under the lock so both loops reach the store in order.
        if outcome.stats_changed {
            services.persist(guard.stats().clone()).await;
        }
        outcome
    };

    if outcome.alert {
        log_info!(
            "posture alert (offset change {:?})",
            outcome.classification.offset_change
        );
        services.notify(Notification::PostureAlert);
    }
}

async fn background_tick(
    context: &SharedContext,
    services: &SessionServices,
    now: DateTime<Utc>,
) {
    let outcome = {
        let mut guard = context.lock().await;
        let outcome = guard.background_tick(now);
        if outcome.stats_changed {
            services.persist(guard.stats().clone()).await;
        }
        outcome
    };

    report_break_event(services, &outcome.event);
}

/// Pushes to the remote store on its own task. A push still running from an
/// earlier tick is left to finish and this tick is skipped.
fn spawn_sync_if_idle(
    remote: &RemoteSync,
    in_flight: &mut Option<JoinHandle<()>>,
    now: DateTime<Utc>,
) {
    if in_flight.as_ref().is_some_and(|task| !task.is_finished()) {
        log_debug!("remote sync still running; skipping");
        return;
    }
    let remote = remote.clone();
    *in_flight = Some(tokio::spawn(async move {
        remote.sync_if_due(now).await;
    }));
}

/// Logs and announces a break transition. Also used for manual dismissal.
pub fn report_break_event(services: &SessionServices, event: &BreakEvent) {
    match event {
        BreakEvent::Idle => {}
        BreakEvent::Started(session) => {
            log_info!(
                "break {} started: {}m ({})",
                session.id,
                session.duration_minutes,
                session.reason
            );
            services.notify(Notification::BreakStarted {
                duration_minutes: session.duration_minutes,
                reason: session.reason.clone(),
            });
        }
        BreakEvent::Ended { session, end } => {
            log_info!("break {} over ({:?}); tracking resumes", session.id, end);
            if *end == BreakEnd::Completed {
                services.notify(Notification::BreakCompleted);
            }
        }
    }
}

/// Swaps in the new day's stats when the local date changes. The new day is
/// loaded without holding the context lock.
async fn roll_over_if_due(context: &SharedContext, services: &SessionServices, now: DateTime<Utc>) {
    let Some(next_key) = context.lock().await.rollover_due(now) else {
        return;
    };
    let next = services.load_stats(&next_key).await;

    let previous = {
        let mut guard = context.lock().await;
        if guard.rollover_due(now).as_deref() != Some(next_key.as_str()) {
            log_debug!("rollover to {next_key} already applied");
            return;
        }
        guard.roll_over(next, now)
    };
    services.persist(previous).await;
}
