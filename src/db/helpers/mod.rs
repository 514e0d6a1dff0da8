use log::warn;

use crate::models::DailyStats;

pub const STATS_KEY_PREFIX: &str = "stats:";

/// Decodes a stored stats value. Unreadable values are treated as absent so
/// a corrupt row resets the day instead of blocking the session.
pub fn decode_stats(key: &str, raw: &str) -> Option<DailyStats> {
    match serde_json::from_str::<DailyStats>(raw) {
        Ok(mut stats) => {
            if stats.date_key.is_empty() {
                stats.date_key = key.trim_start_matches(STATS_KEY_PREFIX).to_string();
            }
            Some(stats)
        }
        Err(err) => {
            warn!("Failed to parse stored stats under {key}, resetting: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_key_is_recovered_from_the_row_key() {
        let stats = decode_stats("stats:2026-03-01", r#"{"totalMs": 40}"#).unwrap();
        assert_eq!(stats.date_key, "2026-03-01");
        assert_eq!(stats.total_ms, 40);
    }

    #[test]
    fn corrupt_value_is_absent() {
        assert!(decode_stats("stats:2026-03-01", "{oops").is_none());
    }
}
