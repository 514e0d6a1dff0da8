//! Checkpoint-based adaptive breaks.
//!
//! Alerts are counted in a fixed window. Each time the window elapses the
//! alert rate picks a break length, and the window restarts. While a break is
//! running the same background tick watches for its end.

use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{BreakEnd, BreakSession};

const HIGH_RATE_PER_MIN: f64 = 1.0;
const MODERATE_RATE_PER_MIN: f64 = 0.5;

const HIGH_RATE_BREAK_MIN: u32 = 10;
const MODERATE_RATE_BREAK_MIN: u32 = 5;
const LOW_RATE_BREAK_MIN: u32 = 2;

/// What a checkpoint with zero alerts should do.
///
/// `MandatoryBreak` keeps the shortest tier for a clean window, so the
/// subject gets a periodic break regardless; `NoBreak` lets a clean window
/// pass without one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroAlertPolicy {
    #[default]
    MandatoryBreak,
    NoBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub interval_minutes: u32,
    pub zero_alert_policy: ZeroAlertPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
            zero_alert_policy: ZeroAlertPolicy::MandatoryBreak,
        }
    }
}

impl SchedulerConfig {
    fn interval_ms(&self) -> u64 {
        u64::from(self.interval_minutes) * 60_000
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointWindow {
    pub window_start: DateTime<Utc>,
    pub alerts_in_window: u32,
    pub interval_ms: u64,
}

impl CheckpointWindow {
    pub fn new(window_start: DateTime<Utc>, interval_ms: u64) -> Self {
        Self {
            window_start,
            alerts_in_window: 0,
            interval_ms,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_ms(now) >= self.interval_ms
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        self.interval_ms.saturating_sub(self.elapsed_ms(now))
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.window_start = now;
        self.alerts_in_window = 0;
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.window_start).num_milliseconds().max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakDecision {
    pub duration_minutes: u32,
    pub alert_rate: f64,
    pub reason: String,
}

/// Picks the break tier for `alerts` seen over `interval_minutes`.
pub fn decide_break(
    alerts: u32,
    interval_minutes: u32,
    zero_alert_policy: ZeroAlertPolicy,
) -> Option<BreakDecision> {
    if alerts == 0 && zero_alert_policy == ZeroAlertPolicy::NoBreak {
        return None;
    }

    let alert_rate = f64::from(alerts) / f64::from(interval_minutes.max(1));
    let (label, duration_minutes) = if alert_rate >= HIGH_RATE_PER_MIN {
        ("High", HIGH_RATE_BREAK_MIN)
    } else if alert_rate >= MODERATE_RATE_PER_MIN {
        ("Moderate", MODERATE_RATE_BREAK_MIN)
    } else {
        ("Low", LOW_RATE_BREAK_MIN)
    };

    Some(BreakDecision {
        duration_minutes,
        alert_rate,
        reason: format!(
            "{label} alert rate (~{alert_rate:.2}/min) over last {interval_minutes}m ({alerts} alerts)."
        ),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakEvent {
    Idle,
    Started(BreakSession),
    Ended { session: BreakSession, end: BreakEnd },
}

#[derive(Debug, Clone)]
pub struct BreakScheduler {
    config: SchedulerConfig,
    window: CheckpointWindow,
    active: Option<BreakSession>,
    armed: bool,
}

impl BreakScheduler {
    pub fn new(config: SchedulerConfig, now: DateTime<Utc>) -> Self {
        Self {
            window: CheckpointWindow::new(now, config.interval_ms()),
            config,
            active: None,
            armed: false,
        }
    }

    pub fn window(&self) -> &CheckpointWindow {
        &self.window
    }

    pub fn active_break(&self) -> Option<&BreakSession> {
        self.active.as_ref()
    }

    pub fn is_on_break(&self) -> bool {
        self.active.is_some()
    }

    /// Starts checkpointing with a fresh window.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.armed = true;
        self.window.reset(now);
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn record_alert(&mut self) {
        self.window.alerts_in_window += 1;
    }

    pub fn time_until_checkpoint(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.armed || self.active.is_some() {
            return None;
        }
        Some(Duration::milliseconds(self.window.remaining_ms(now) as i64))
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> BreakEvent {
        if let Some(session) = self.active.as_ref() {
            if session.is_expired(now) {
                return self.finish(now, BreakEnd::Completed);
            }
            return BreakEvent::Idle;
        }

        if !self.armed || !self.window.is_due(now) {
            return BreakEvent::Idle;
        }

        let alerts = self.window.alerts_in_window;
        self.window.reset(now);

        let Some(decision) =
            decide_break(alerts, self.config.interval_minutes, self.config.zero_alert_policy)
        else {
            info!(
                "{}-min checkpoint: no alerts, no break",
                self.config.interval_minutes
            );
            return BreakEvent::Idle;
        };

        info!(
            "{}-min checkpoint: {} alerts ({:.2}/min), break={}m",
            self.config.interval_minutes, alerts, decision.alert_rate, decision.duration_minutes
        );

        let session = BreakSession {
            id: Uuid::new_v4().to_string(),
            started_at: now,
            end_time: now + Duration::minutes(i64::from(decision.duration_minutes)),
            duration_minutes: decision.duration_minutes,
            reason: decision.reason,
        };
        self.active = Some(session.clone());
        BreakEvent::Started(session)
    }

    /// Ends the running break early. Same effect as reaching its end time.
    pub fn dismiss(&mut self, now: DateTime<Utc>) -> BreakEvent {
        if self.active.is_none() {
            return BreakEvent::Idle;
        }
        self.finish(now, BreakEnd::Dismissed)
    }

    fn finish(&mut self, now: DateTime<Utc>, end: BreakEnd) -> BreakEvent {
        let Some(session) = self.active.take() else {
            return BreakEvent::Idle;
        };
        // Pre-break alerts must not trigger another break right away.
        self.window.reset(now);
        info!("break {} ended ({:?})", session.id, end);
        BreakEvent::Ended { session, end }
    }
}
