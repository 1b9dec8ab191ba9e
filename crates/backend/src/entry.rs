use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Display name, the last path component
    pub name: String,

    /// Absolute path of the item
    pub path: PathBuf,

    pub is_dir: bool,

    /// Size in bytes, files only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Last modification time in seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
}

impl FileEntry {
    /// Create a file entry named after the last component of `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::from_path(path.into(), false)
    }

    /// Create a directory entry named after the last component of `path`
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::from_path(path.into(), true)
    }

    fn from_path(path: PathBuf, is_dir: bool) -> Self {
        Self {
            name: display_name(&path),
            path,
            is_dir,
            size: None,
            modified: None,
        }
    }

    /// Lowercased extension of the display name, if it has one
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }
}

/// Last path component as a lossy string.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased text after the last `.` in `name`.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}
