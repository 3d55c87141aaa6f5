/// Persisted user preferences: the notification and sound flags
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::error::SettingsError;

pub const NOTIFICATIONS_KEY: &str = "notificationsEnabled";
pub const SOUND_KEY: &str = "soundEnabled";

/// Simple key-value persistence for boolean preferences
pub trait SettingsStore: Send + Sync {
    fn load_bool(&self, key: &str, default: bool) -> bool;
    fn save_bool(&self, key: &str, value: bool) -> Result<(), SettingsError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            sound_enabled: true,
        }
    }
}

impl Settings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();
        Self {
            notifications_enabled: store.load_bool(NOTIFICATIONS_KEY, defaults.notifications_enabled),
            sound_enabled: store.load_bool(SOUND_KEY, defaults.sound_enabled),
        }
    }
}

/// JSON object of flags on disk, e.g. `{"notificationsEnabled": false}`.
///
/// Unknown keys in the file are kept when writing back.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the platform config location
    pub fn at_default_path() -> Self {
        Self::new(default_settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, serde_json::Value>, SettingsError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| SettingsError::Read {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl SettingsStore for JsonFileStore {
    fn load_bool(&self, key: &str, default: bool) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.read_all() {
            Ok(values) => values.get(key).and_then(|v| v.as_bool()).unwrap_or(default),
            Err(e) => {
                tracing::warn!(error = %e, key, "Could not read settings, using default");
                default
            }
        }
    }

    fn save_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        // A corrupt file is replaced rather than blocking every future save
        let mut values = self.read_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Overwriting unreadable settings file");
            BTreeMap::new()
        });
        values.insert(key.to_string(), serde_json::Value::Bool(value));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(&values).map_err(SettingsError::Serialize)?;
        fs::write(&self.path, content).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-process store, nothing survives the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load_bool(&self, key: &str, default: bool) -> bool {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).copied().unwrap_or(default)
    }

    fn save_bool(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// `<config dir>/timebar/settings.json`, or a file in the working directory
pub fn default_settings_path() -> PathBuf {
    if let Some(config) = dirs::config_dir() {
        config.join("timebar").join("settings.json")
    } else {
        PathBuf::from("timebar-settings.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_enabled() {
        let settings = Settings::load(&MemoryStore::new());
        assert_eq!(settings, Settings::default());
        assert!(settings.notifications_enabled);
        assert!(settings.sound_enabled);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        assert!(store.load_bool(SOUND_KEY, true));
        assert!(!store.load_bool(SOUND_KEY, false));
    }

    #[test]
    fn file_store_round_trips_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = JsonFileStore::new(&path);

        store.save_bool(NOTIFICATIONS_KEY, false).unwrap();
        store.save_bool(SOUND_KEY, true).unwrap();

        let reopened = JsonFileStore::new(&path);
        let settings = Settings::load(&reopened);
        assert!(!settings.notifications_enabled);
        assert!(settings.sound_enabled);
    }

    #[test]
    fn save_preserves_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"launchAtLogin": true}"#).unwrap();

        let store = JsonFileStore::new(&path);
        store.save_bool(SOUND_KEY, false).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["launchAtLogin"], serde_json::Value::Bool(true));
        assert_eq!(raw[SOUND_KEY], serde_json::Value::Bool(false));
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load_bool(NOTIFICATIONS_KEY, true));

        store.save_bool(NOTIFICATIONS_KEY, false).unwrap();
        assert!(!store.load_bool(NOTIFICATIONS_KEY, true));
    }

    #[test]
    fn default_path_is_config_dir_or_working_dir() {
        let path = default_settings_path();
        match dirs::config_dir() {
            Some(config) => assert_eq!(path, config.join("timebar").join("settings.json")),
            None => assert_eq!(path, PathBuf::from("timebar-settings.json")),
        }
    }

    #[test]
    fn non_bool_value_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"soundEnabled": "yes"}"#).unwrap();
        assert!(JsonFileStore::new(&path).load_bool(SOUND_KEY, true));
    }
}
