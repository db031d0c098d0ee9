//! Persisted preference record.
//!
//! The capture loop only cares about the last camera; the remaining fields belong to
//! the UI and are carried through untouched, including keys this crate does not model.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capture::types::DeviceInfo;
use crate::shared::errors::StorageError;
use crate::shared::paths::{ensure_dir, get_preferences_path};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Auto,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub selected_camera_id: Option<String>,
    #[serde(default)]
    pub camera_label: Option<String>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub high_performance: bool,
    #[serde(default = "default_true")]
    pub voice_output: bool,
    #[serde(default)]
    pub high_contrast: bool,
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub first_visit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_visit_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_camera_id: None,
            camera_label: None,
            theme: Theme::Dark,
            high_performance: false,
            voice_output: true,
            high_contrast: false,
            session_count: 0,
            first_visit_at: None,
            last_visit_at: None,
            saved_at: None,
            extra: Map::new(),
        }
    }
}

/// JSON file holding [`Preferences`].
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Self {
        Self::new(get_preferences_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Preferences, StorageError> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load, degrading unreadable or corrupt files to defaults.
    pub fn load_or_default(&self) -> Preferences {
        self.load().unwrap_or_else(|e| {
            tracing::warn!(target: "system", "[PREFS] Failed to load preferences from {:?}: {}", self.path, e);
            Preferences::default()
        })
    }

    pub fn save(&self, preferences: &Preferences) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            ensure_dir(dir).map_err(|e| StorageError::directory(e.to_string()))?;
        }

        let mut preferences = preferences.clone();
        preferences.saved_at = Some(Utc::now());

        let content = serde_json::to_string_pretty(&preferences)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn update<F>(&self, apply: F) -> Result<Preferences, StorageError>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut preferences = self.load_or_default();
        apply(&mut preferences);
        self.save(&preferences)?;
        Ok(preferences)
    }

    pub fn last_camera_id(&self) -> Option<String> {
        self.load_or_default().selected_camera_id
    }

    pub fn remember_camera(&self, device: &DeviceInfo) -> Result<(), StorageError> {
        self.update(|prefs| {
            prefs.selected_camera_id = Some(device.device_id.clone());
            prefs.camera_label = Some(device.label.clone());
        })
        .map(|_| ())
    }

    /// Bump the session counter and visit timestamps.
    pub fn record_visit(&self) -> Result<Preferences, StorageError> {
        self.update(|prefs| {
            let now = Utc::now();
            prefs.session_count = prefs.session_count.saturating_add(1);
            prefs.first_visit_at.get_or_insert(now);
            prefs.last_visit_at = Some(now);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PreferenceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("preferences.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_file_is_default() {
        let (_dir, store) = store();
        let prefs = store.load().unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.voice_output);
        assert_eq!(prefs.theme, Theme::Dark);
    }

    #[test]
    fn test_remember_camera_round_trip() {
        let (_dir, store) = store();
        store
            .remember_camera(&DeviceInfo::video("usb-1", "USB Cam"))
            .unwrap();

        assert_eq!(store.last_camera_id().as_deref(), Some("usb-1"));
        let prefs = store.load().unwrap();
        assert_eq!(prefs.camera_label.as_deref(), Some("USB Cam"));
        assert!(prefs.saved_at.is_some());
    }

    #[test]
    fn test_unknown_fields_and_partial_records() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"selectedCameraId":"cam","theme":"light","somethingElse":1}"#,
        )
        .unwrap();

        let prefs = store.load().unwrap();
        assert_eq!(prefs.selected_camera_id.as_deref(), Some("cam"));
        assert_eq!(prefs.theme, Theme::Light);
        assert!(prefs.voice_output);
    }

    #[test]
    fn test_rewrite_keeps_unmodelled_keys() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"selectedCameraId":"cam","fontSize":"large","shortcuts":{"toggle":"Space"}}"#,
        )
        .unwrap();

        store
            .remember_camera(&DeviceInfo::video("usb-1", "USB Cam"))
            .unwrap();
        store.record_visit().unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["selectedCameraId"], "usb-1");
        assert_eq!(raw["fontSize"], "large");
        assert_eq!(raw["shortcuts"]["toggle"], "Space");
    }

    #[test]
    fn test_corrupt_file_degrades_to_default() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.load().is_err());
        assert_eq!(store.load_or_default(), Preferences::default());
    }

    #[test]
    fn test_record_visit_counts_sessions() {
        let (_dir, store) = store();
        store.record_visit().unwrap();
        let prefs = store.record_visit().unwrap();

        assert_eq!(prefs.session_count, 2);
        assert!(prefs.first_visit_at.unwrap() <= prefs.last_visit_at.unwrap());
    }
}
