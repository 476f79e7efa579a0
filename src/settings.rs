use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::export::{config::DEFAULT_TIMEOUT_SECS, ExportPolicy};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "database.db";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    /// Default folder for exported clips. `None` means ask every time.
    pub output_dir: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
    /// Per-segment transcode limit in seconds; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ExportSettings {
    pub fn policy(&self) -> ExportPolicy {
        ExportPolicy::default().with_timeout_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChimeSettings {
    pub enabled: bool,
}

impl Default for ChimeSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    /// Directory holding recorded videos and their sidecars.
    pub storage_path: Option<PathBuf>,
    /// Directory holding `database.db`.
    pub database_path: Option<PathBuf>,
    pub export: ExportSettings,
    pub chime: ChimeSettings,
}

/// `config.json` in the data directory, persisted on every change.
pub struct SettingsStore {
    path: PathBuf,
    data_dir: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data_dir: data_dir.to_path_buf(),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<UserSettings> {
        Ok(self.read()?.clone())
    }

    pub fn storage_dir(&self) -> Result<PathBuf> {
        Ok(self
            .read()?
            .storage_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("videos")))
    }

    pub fn database_file(&self) -> Result<PathBuf> {
        let dir = self
            .read()?
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.clone());
        Ok(dir.join(DATABASE_FILE_NAME))
    }

    pub fn export(&self) -> Result<ExportSettings> {
        Ok(self.read()?.export.clone())
    }

    pub fn chime(&self) -> Result<ChimeSettings> {
        Ok(self.read()?.chime.clone())
    }

    /// Apply `change` and write the result to disk.
    pub fn update(&self, change: impl FnOnce(&mut UserSettings)) -> Result<UserSettings> {
        let mut guard = self.write()?;
        change(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, UserSettings>> {
        self.data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, UserSettings>> {
        self.data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();

        assert_eq!(store.storage_dir().unwrap(), dir.path().join("videos"));
        assert_eq!(store.database_file().unwrap(), dir.path().join("database.db"));
        let export = store.export().unwrap();
        assert_eq!(export.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(export.timeout_secs, 600);
        assert!(!store.path().exists());
    }

    #[test]
    fn updates_are_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        store
            .update(|settings| {
                settings.storage_path = Some(PathBuf::from("/media/videos"));
                settings.export.timeout_secs = 0;
            })
            .unwrap();

        let reopened = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(reopened.storage_dir().unwrap(), PathBuf::from("/media/videos"));
        assert_eq!(reopened.export().unwrap().policy().timeout, None);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(reopened.path()).unwrap()).unwrap();
        assert_eq!(raw["storagePath"], "/media/videos");
        assert_eq!(raw["export"]["timeoutSecs"], 0);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{"databasePath": "/var/qrcam"}"#,
        )
        .unwrap();

        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(
            store.database_file().unwrap(),
            PathBuf::from("/var/qrcam/database.db")
        );
        assert!(store.chime().unwrap().enabled);
    }

    #[test]
    fn corrupt_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "{not json").unwrap();
        let store = SettingsStore::open(dir.path()).unwrap();
        assert_eq!(store.get().unwrap(), UserSettings::default());
    }
}
