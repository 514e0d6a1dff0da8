use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::{
    helpers::{decode_stats, STATS_KEY_PREFIX},
    Database,
};
use crate::models::DailyStats;

pub fn stats_key(date_key: &str) -> String {
    format!("{STATS_KEY_PREFIX}{date_key}")
}

impl Database {
    pub async fn load_daily_stats(&self, date_key: &str) -> Result<Option<DailyStats>> {
        let key = stats_key(date_key);
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .context("failed to read daily stats")?;

            Ok(raw.and_then(|raw| decode_stats(&key, &raw)))
        })
        .await
    }

    pub async fn save_daily_stats(&self, stats: &DailyStats) -> Result<()> {
        let key = stats_key(&stats.date_key);
        let value = serde_json::to_string(stats).context("failed to serialize daily stats")?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .context("failed to write daily stats")?;
            Ok(())
        })
        .await
    }

    /// Most recent days first.
    pub async fn list_daily_stats(&self, limit: usize) -> Result<Vec<DailyStats>> {
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM kv_store
                 WHERE key LIKE 'stats:%'
                 ORDER BY key DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut days = Vec::new();
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let value: String = row.get(1)?;
                if let Some(stats) = decode_stats(&key, &value) {
                    days.push(stats);
                }
            }

            Ok(days)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("posturewatch.sqlite3")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn stats_round_trip_under_their_date_key() {
        let (_dir, db) = open();
        assert_eq!(db.load_daily_stats("2026-03-01").await.unwrap(), None);

        let mut stats = DailyStats::empty("2026-03-01");
        stats.good_ms = 1_200;
        db.save_daily_stats(&stats).await.unwrap();
        stats.good_ms = 2_400;
        db.save_daily_stats(&stats).await.unwrap();

        let loaded = db.load_daily_stats("2026-03-01").await.unwrap().unwrap();
        assert_eq!(loaded.good_ms, 2_400);
        assert_eq!(db.load_daily_stats("2026-03-02").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_row_reads_as_missing() {
        let (_dir, db) = open();
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES ('stats:2026-03-01', 'garbage', '')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(db.load_daily_stats("2026-03-01").await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let (_dir, db) = open();
        for day in ["2026-03-01", "2026-03-03", "2026-03-02"] {
            db.save_daily_stats(&DailyStats::empty(day)).await.unwrap();
        }

        let keys: Vec<String> = db
            .list_daily_stats(2)
            .await
            .unwrap()
            .into_iter()
            .map(|stats| stats.date_key)
            .collect();
        assert_eq!(keys, vec!["2026-03-03", "2026-03-02"]);
    }

    #[test]
    fn keys_are_prefixed() {
        assert_eq!(stats_key("2026-03-01"), "stats:2026-03-01");
    }
}
