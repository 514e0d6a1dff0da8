use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::breaks::{SchedulerConfig, ZeroAlertPolicy};
use crate::calibration::clamp_multiplier;
use crate::posture::ClassifierConfig;

pub const DEFAULT_THRESHOLD_MULTIPLIER: f32 = 0.4;

/// Credentials for pushing stats to the account service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub base_url: String,
    pub auth_token: String,
    pub subject_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureSettings {
    pub threshold_multiplier: f32,
    pub checkpoint_interval_minutes: u32,
    pub bad_posture_duration_ms: u64,
    pub good_posture_required_ms: u64,
    pub zero_alert_policy: ZeroAlertPolicy,
    pub frame_interval_ms: u64,
    pub background_interval_ms: u64,
    pub remote_sync_interval_secs: u64,
    pub remote: Option<RemoteSettings>,
}

impl Default for PostureSettings {
    fn default() -> Self {
        Self {
            threshold_multiplier: DEFAULT_THRESHOLD_MULTIPLIER,
            checkpoint_interval_minutes: 10,
            bad_posture_duration_ms: 15_000,
            good_posture_required_ms: 1_000,
            zero_alert_policy: ZeroAlertPolicy::MandatoryBreak,
            frame_interval_ms: 50,
            background_interval_ms: 1_000,
            remote_sync_interval_secs: 60,
            remote: None,
        }
    }
}

impl PostureSettings {
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            bad_posture_duration_ms: self.bad_posture_duration_ms,
            good_posture_required_ms: self.good_posture_required_ms,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval_minutes: self.checkpoint_interval_minutes.max(1),
            zero_alert_policy: self.zero_alert_policy,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<PostureSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                PostureSettings::default()
            })
        } else {
            PostureSettings::default()
        };
        data.threshold_multiplier = clamp_multiplier(data.threshold_multiplier);

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> PostureSettings {
        self.read().clone()
    }

    /// Stores the clamped multiplier and returns the value actually kept.
    pub fn update_threshold_multiplier(&self, multiplier: f32) -> Result<f32> {
        let mut guard = self.write();
        guard.threshold_multiplier = clamp_multiplier(multiplier);
        self.persist(&guard)?;
        Ok(guard.threshold_multiplier)
    }

    fn persist(&self, data: &PostureSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, PostureSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PostureSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.current(), PostureSettings::default());
    }

    #[test]
    fn multiplier_is_clamped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        assert_eq!(store.update_threshold_multiplier(0.95).unwrap(), 0.8);
        assert_eq!(store.update_threshold_multiplier(0.1).unwrap(), 0.4);
        assert_eq!(store.update_threshold_multiplier(0.6).unwrap(), 0.6);

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.current().threshold_multiplier, 0.6);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"checkpoint_interval_minutes": 1, "threshold_multiplier": 2.0}"#)
            .unwrap();

        let settings = SettingsStore::new(path).unwrap().current();
        assert_eq!(settings.checkpoint_interval_minutes, 1);
        assert_eq!(settings.threshold_multiplier, 0.8);
        assert_eq!(settings.bad_posture_duration_ms, 15_000);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(
            SettingsStore::new(path).unwrap().current(),
            PostureSettings::default()
        );
    }
}
