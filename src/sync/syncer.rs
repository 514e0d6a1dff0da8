use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::models::DailyStats;
use crate::settings::PostureSettings;

use super::remote::{HttpRemoteStore, NoopRemoteStore, RemoteStatsStore};

struct SyncState {
    /// Latest unsent snapshot per date key.
    pending: BTreeMap<String, DailyStats>,
    last_attempt: Option<DateTime<Utc>>,
}

/// Coalescing push of daily stats to the remote store.
///
/// Snapshots are queued on every mutation but pushed at most once per
/// interval. Anything that fails to send stays queued for the next interval
/// unless a newer snapshot for the same day replaced it meanwhile.
#[derive(Clone)]
pub struct RemoteSync {
    store: Arc<dyn RemoteStatsStore>,
    subject_id: Arc<str>,
    interval: Duration,
    state: Arc<Mutex<SyncState>>,
}

impl RemoteSync {
    pub fn new(store: Arc<dyn RemoteStatsStore>, subject_id: &str, interval: Duration) -> Self {
        Self {
            store,
            subject_id: Arc::from(subject_id),
            interval,
            state: Arc::new(Mutex::new(SyncState {
                pending: BTreeMap::new(),
                last_attempt: None,
            })),
        }
    }

    /// HTTP-backed when the settings carry credentials, otherwise a no-op.
    pub fn from_settings(settings: &PostureSettings) -> Self {
        let interval = Duration::seconds(settings.remote_sync_interval_secs as i64);
        match settings.remote.as_ref() {
            Some(remote) => {
                info!("remote stats sync enabled for subject {}", remote.subject_id);
                Self::new(
                    Arc::new(HttpRemoteStore::new(remote)),
                    &remote.subject_id,
                    interval,
                )
            }
            None => Self::new(Arc::new(NoopRemoteStore), "", interval),
        }
    }

    pub async fn queue(&self, stats: DailyStats) {
        let mut state = self.state.lock().await;
        state.pending.insert(stats.date_key.clone(), stats);
    }

    #[cfg(test)]
    pub(crate) async fn pending_days(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Pushes queued snapshots if the sync interval has elapsed.
    pub async fn sync_if_due(&self, now: DateTime<Utc>) {
        let batch = {
            let mut state = self.state.lock().await;
            let due = state
                .last_attempt
                .map_or(true, |last| now - last >= self.interval);
            if !due || state.pending.is_empty() {
                return;
            }
            state.last_attempt = Some(now);
            std::mem::take(&mut state.pending)
        };
        self.push(batch).await;
    }

    /// Pushes everything queued regardless of the interval.
    pub async fn flush(&self, now: DateTime<Utc>) {
        let batch = {
            let mut state = self.state.lock().await;
            state.last_attempt = Some(now);
            std::mem::take(&mut state.pending)
        };
        if !batch.is_empty() {
            self.push(batch).await;
        }
    }

    /// Remote snapshot for the day, or `None` if absent or unreachable.
    pub async fn fetch(&self, date_key: &str) -> Option<DailyStats> {
        let store = Arc::clone(&self.store);
        let subject_id = Arc::clone(&self.subject_id);
        let date_key = date_key.to_string();

        let result = tokio::task::spawn_blocking(move || {
            store.fetch_daily_stats(&subject_id, &date_key)
        })
        .await;

        match result {
            Ok(Ok(stats)) => stats,
            Ok(Err(err)) => {
                warn!("remote stats fetch failed: {err:#}");
                None
            }
            Err(join_err) => {
                warn!("remote stats fetch worker failed: {join_err}");
                None
            }
        }
    }

    async fn push(&self, batch: BTreeMap<String, DailyStats>) {
        let store = Arc::clone(&self.store);
        let subject_id = Arc::clone(&self.subject_id);
        let snapshots: Vec<DailyStats> = batch.into_values().collect();

        let result = tokio::task::spawn_blocking(move || {
            let mut failed = Vec::new();
            for stats in snapshots {
                if let Err(err) = store.upsert_daily_stats(&subject_id, &stats) {
                    warn!("remote stats sync for {} failed: {err:#}", stats.date_key);
                    failed.push(stats);
                }
            }
            failed
        })
        .await;

        let failed = match result {
            Ok(failed) => failed,
            Err(join_err) => {
                warn!("remote stats sync worker failed: {join_err}");
                return;
            }
        };

        if failed.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for stats in failed {
            state
                .pending
                .entry(stats.date_key.clone())
                .or_insert(stats);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::remote::memory::MemoryRemoteStore;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::seconds(secs)
    }

    fn stats(day: &str, total_ms: u64) -> DailyStats {
        DailyStats {
            total_ms,
            ..DailyStats::empty(day)
        }
    }

    fn syncer(store: &Arc<MemoryRemoteStore>) -> RemoteSync {
        RemoteSync::new(store.clone(), "subject", Duration::seconds(60))
    }

    #[tokio::test]
    async fn pushes_are_coalesced_per_interval() {
        let store = Arc::new(MemoryRemoteStore::default());
        let sync = syncer(&store);

        sync.queue(stats("2026-03-02", 100)).await;
        sync.sync_if_due(t(0)).await;
        assert_eq!(store.get("subject", "2026-03-02").unwrap().total_ms, 100);

        sync.queue(stats("2026-03-02", 200)).await;
        sync.queue(stats("2026-03-02", 300)).await;
        sync.sync_if_due(t(30)).await;
        assert_eq!(store.get("subject", "2026-03-02").unwrap().total_ms, 100);
        assert_eq!(sync.pending_days().await, 1);

        sync.sync_if_due(t(60)).await;
        assert_eq!(store.get("subject", "2026-03-02").unwrap().total_ms, 300);
        assert_eq!(sync.pending_days().await, 0);
    }

    #[tokio::test]
    async fn failed_push_is_retried_next_interval() {
        let store = Arc::new(MemoryRemoteStore::default());
        let sync = syncer(&store);

        store.set_failing(true);
        sync.queue(stats("2026-03-02", 100)).await;
        sync.sync_if_due(t(0)).await;
        assert_eq!(sync.pending_days().await, 1);

        store.set_failing(false);
        sync.sync_if_due(t(10)).await;
        assert!(store.get("subject", "2026-03-02").is_none());

        sync.sync_if_due(t(60)).await;
        assert_eq!(store.get("subject", "2026-03-02").unwrap().total_ms, 100);
    }

    #[tokio::test]
    async fn newer_snapshot_wins_over_failed_one() {
        let store = Arc::new(MemoryRemoteStore::default());
        let sync = syncer(&store);

        store.set_failing(true);
        sync.queue(stats("2026-03-02", 100)).await;
        sync.flush(t(0)).await;
        sync.queue(stats("2026-03-02", 500)).await;

        store.set_failing(false);
        sync.flush(t(1)).await;
        assert_eq!(store.get("subject", "2026-03-02").unwrap().total_ms, 500);
    }

    #[tokio::test]
    async fn fetch_failure_reads_as_missing() {
        let store = Arc::new(MemoryRemoteStore::default());
        store.insert("subject", stats("2026-03-02", 700));
        let sync = syncer(&store);

        assert_eq!(sync.fetch("2026-03-02").await.map(|s| s.total_ms), Some(700));
        store.set_failing(true);
        assert_eq!(sync.fetch("2026-03-02").await, None);
    }
}
