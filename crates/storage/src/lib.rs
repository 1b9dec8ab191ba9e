//! On-disk settings for the file manager.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Overrides the storage root, mostly for tests and portable installs.
pub const DATA_DIR_ENV_VAR: &str = "DEVTOOLKIT_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// File manager settings as the settings screen stores them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSettings {
    /// Thumbnail fetches allowed in flight per view
    pub file_max_concurrent_thumbnails: usize,

    /// Edge length requested for video frames
    pub file_thumbnail_size: u32,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self { file_max_concurrent_thumbnails: 5, file_thumbnail_size: 48 }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: FileSettings,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "DevToolkit", "DevToolkit")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    /// Use `DEVTOOLKIT_DATA_DIR` when set, the platform directory otherwise
    pub fn from_env() -> Result<Self, StorageError> {
        match std::env::var_os(DATA_DIR_ENV_VAR) {
            Some(dir) if !dir.is_empty() => Ok(Self::with_root(dir)),
            _ => Self::from_default_project(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn load_settings(&self) -> Result<FileSettings, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(FileSettings::default());
        }

        let bytes = fs::read(path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != SETTINGS_SCHEMA_VERSION {
            log::warn!(
                "settings schema version {} differs from {SETTINGS_SCHEMA_VERSION}",
                envelope.version
            );
        }

        Ok(envelope.settings)
    }

    pub fn save_settings(&self, settings: &FileSettings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope = SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: *settings };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.settings_path(), bytes)?;
        Ok(())
    }
}
