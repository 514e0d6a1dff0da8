use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::DailyStats;
use crate::settings::RemoteSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The account service's stats endpoint.
///
/// Upserts are keyed by `(subject_id, date_key)`; the service keeps the
/// larger longest-streak value and overwrites every other field. Calls block,
/// so async callers go through `spawn_blocking`.
pub trait RemoteStatsStore: Send + Sync {
    fn upsert_daily_stats(&self, subject_id: &str, stats: &DailyStats) -> Result<()>;

    fn fetch_daily_stats(&self, subject_id: &str, date_key: &str) -> Result<Option<DailyStats>>;
}

/// Stand-in for unauthenticated sessions.
pub struct NoopRemoteStore;

impl RemoteStatsStore for NoopRemoteStore {
    fn upsert_daily_stats(&self, _subject_id: &str, _stats: &DailyStats) -> Result<()> {
        Ok(())
    }

    fn fetch_daily_stats(&self, _subject_id: &str, _date_key: &str) -> Result<Option<DailyStats>> {
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
struct StatsUpdateRequest<'a> {
    subject_id: &'a str,
    date: &'a str,
    total_ms: u64,
    good_ms: u64,
    bad_ms: u64,
    streak_ms: u64,
    alerts: u32,
}

#[derive(Debug, Deserialize)]
struct StatsRow {
    date: String,
    total_ms: u64,
    good_ms: u64,
    bad_ms: u64,
    longest_streak_ms: u64,
    alert_count: u32,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    stats: Option<StatsRow>,
}

impl From<StatsRow> for DailyStats {
    fn from(row: StatsRow) -> Self {
        Self {
            date_key: row.date,
            total_ms: row.total_ms,
            good_ms: row.good_ms,
            bad_ms: row.bad_ms,
            longest_good_streak_ms: row.longest_streak_ms,
            alert_count: row.alert_count,
        }
    }
}

pub struct HttpRemoteStore {
    base_url: String,
    auth_token: String,
}

impl HttpRemoteStore {
    pub fn new(settings: &RemoteSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            auth_token: settings.auth_token.clone(),
        }
    }

    // Built per call: a blocking client must not be dropped on an async worker.
    fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")
    }
}

impl RemoteStatsStore for HttpRemoteStore {
    fn upsert_daily_stats(&self, subject_id: &str, stats: &DailyStats) -> Result<()> {
        let body = StatsUpdateRequest {
            subject_id,
            date: &stats.date_key,
            total_ms: stats.total_ms,
            good_ms: stats.good_ms,
            bad_ms: stats.bad_ms,
            streak_ms: stats.longest_good_streak_ms,
            alerts: stats.alert_count,
        };

        self.client()?
            .post(format!("{}/stats/update", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .context("stats update request failed")?
            .error_for_status()
            .context("stats update rejected")?;
        Ok(())
    }

    fn fetch_daily_stats(&self, subject_id: &str, date_key: &str) -> Result<Option<DailyStats>> {
        let response = self
            .client()?
            .get(format!("{}/stats/{date_key}", self.base_url))
            .bearer_auth(&self.auth_token)
            .query(&[("subject_id", subject_id)])
            .send()
            .context("stats fetch request failed")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let payload: StatsResponse = response
            .error_for_status()
            .context("stats fetch rejected")?
            .json()
            .context("malformed stats response")?;
        Ok(payload.stats.map(DailyStats::from))
    }
}
