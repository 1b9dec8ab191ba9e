//! Local filesystem backend.
//!
//! Implements every backend RPC directly on top of `tokio::fs`, so the
//! thumbnail queue and the CLI can run without the desktop shell.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::fs;
use tokio::sync::OnceCell;

use crate::entry::display_name;
use crate::error::io_error;
use crate::{ffmpeg, BackendError, FileEntry, ThumbnailSource};

/// Environment variable pointing at an FFmpeg executable.
pub const FFMPEG_ENV_VAR: &str = "DEVTOOLKIT_FFMPEG";

/// Environment variable overriding the largest file `read_file*` accepts.
pub const MAX_FILE_BYTES_ENV_VAR: &str = "DEVTOOLKIT_MAX_FILE_BYTES";

/// Configuration for [`LocalBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalBackendConfig {
    /// Files above this size are rejected by `read_file` and `read_file_base64`
    pub max_file_bytes: u64,

    /// Explicit FFmpeg executable; probed for when `None`
    pub ffmpeg_path: Option<PathBuf>,

    /// Scratch directory for extracted video frames
    pub temp_dir: PathBuf,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 64 * 1024 * 1024,
            ffmpeg_path: None,
            temp_dir: std::env::temp_dir().join("devtoolkit-thumbs"),
        }
    }
}

impl LocalBackendConfig {
    /// Loads configuration from environment variables.
    ///
    /// - `DEVTOOLKIT_FFMPEG`: path to the FFmpeg executable
    /// - `DEVTOOLKIT_MAX_FILE_BYTES`: read size limit in bytes (default: 64 MiB)
    pub fn from_env() -> Result<Self, BackendError> {
        let mut config = Self::default();

        if let Some(path) = std::env::var_os(FFMPEG_ENV_VAR) {
            config.ffmpeg_path = Some(PathBuf::from(path));
        }

        if let Ok(val) = std::env::var(MAX_FILE_BYTES_ENV_VAR) {
            config.max_file_bytes =
                val.trim()
                    .parse::<u64>()
                    .map_err(|_| BackendError::InvalidConfig {
                        key: MAX_FILE_BYTES_ENV_VAR.to_string(),
                        value: val.clone(),
                    })?;
        }

        Ok(config)
    }

    pub fn with_max_file_bytes(mut self, limit: u64) -> Self {
        self.max_file_bytes = limit;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }
}

/// Backend operating on the local filesystem.
pub struct LocalBackend {
    config: LocalBackendConfig,
    ffmpeg: OnceCell<PathBuf>,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Self {
        Self {
            config,
            ffmpeg: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    /// `read_directory`: list `dir`, directories first, then by name.
    ///
    /// Hidden entries (leading `.`) are skipped, as are entries whose
    /// metadata cannot be read.
    pub async fn read_directory(&self, dir: &Path) -> Result<Vec<FileEntry>, BackendError> {
        let mut reader = fs::read_dir(dir).await.map_err(io_error(dir))?;
        let mut entries = Vec::new();

        while let Some(item) = reader.next_entry().await.map_err(io_error(dir))? {
            let path = item.path();
            let name = display_name(&path);
            if name.is_empty() || name.starts_with('.') {
                continue;
            }

            let metadata = match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) => {
                    log::debug!("skipping {}: {err}", path.display());
                    continue;
                }
            };

            let is_dir = metadata.is_dir();
            let modified = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|age| age.as_secs());

            entries.push(FileEntry {
                name,
                path,
                is_dir,
                size: (!is_dir).then(|| metadata.len()),
                modified,
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    async fn ensure_readable(&self, path: &Path) -> Result<(), BackendError> {
        let size = fs::metadata(path).await.map_err(io_error(path))?.len();
        if size > self.config.max_file_bytes {
            return Err(BackendError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.config.max_file_bytes,
            });
        }
        Ok(())
    }

    /// `read_file`: contents of a UTF-8 text file.
    pub async fn read_file(&self, path: &Path) -> Result<String, BackendError> {
        self.ensure_readable(path).await?;
        fs::read_to_string(path).await.map_err(io_error(path))
    }

    /// `read_file_base64`: contents of any file, base64 encoded.
    pub async fn read_file_base64(&self, path: &Path) -> Result<String, BackendError> {
        self.ensure_readable(path).await?;
        let bytes = fs::read(path).await.map_err(io_error(path))?;
        Ok(STANDARD.encode(bytes))
    }

    /// `write_file`: replace the contents of `path`.
    pub async fn write_file(&self, path: &Path, content: &str) -> Result<(), BackendError> {
        fs::write(path, content).await.map_err(io_error(path))
    }

    /// `extract_video_thumbnail`: first frame of a video as base64 PNG.
    pub async fn extract_video_thumbnail(
        &self,
        path: &Path,
        size: u32,
    ) -> Result<String, BackendError> {
        let ffmpeg = self
            .ffmpeg
            .get_or_try_init(|| ffmpeg::locate(self.config.ffmpeg_path.as_deref()))
            .await?;

        let png = ffmpeg::extract_first_frame(ffmpeg, path, size, &self.config.temp_dir).await?;
        Ok(STANDARD.encode(png))
    }

    /// `delete_item`: remove a file, or a directory and its contents.
    pub async fn delete_item(&self, path: &Path) -> Result<(), BackendError> {
        let metadata = fs::symlink_metadata(path).await.map_err(io_error(path))?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).await.map_err(io_error(path))
        } else {
            fs::remove_file(path).await.map_err(io_error(path))
        }
    }

    /// `rename_item`: rename in place, returning the new path.
    pub async fn rename_item(&self, path: &Path, new_name: &str) -> Result<PathBuf, BackendError> {
        validate_name(new_name)?;
        let parent = path.parent().ok_or_else(|| {
            BackendError::InvalidPath(format!("cannot rename {}", path.display()))
        })?;

        let target = parent.join(new_name);
        fs::rename(path, &target).await.map_err(io_error(path))?;
        Ok(target)
    }

    /// `create_directory`: returns the name actually used.
    pub async fn create_directory(
        &self,
        parent: &Path,
        name: &str,
    ) -> Result<String, BackendError> {
        validate_name(name)?;
        let target = unique_path(parent.join(name)).await;
        fs::create_dir_all(&target).await.map_err(io_error(&target))?;
        Ok(display_name(&target))
    }

    /// `create_file`: creates an empty file, returns the name actually used.
    pub async fn create_file(&self, parent: &Path, name: &str) -> Result<String, BackendError> {
        validate_name(name)?;
        let target = unique_path(parent.join(name)).await;
        fs::File::create(&target).await.map_err(io_error(&target))?;
        Ok(display_name(&target))
    }

    /// `move_item`: move `source` into `dest_dir`, returning the final path.
    pub async fn move_item(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let target = self.transfer_target(source, dest_dir).await?;
        fs::rename(source, &target).await.map_err(io_error(source))?;
        Ok(target)
    }

    /// `copy_item`: copy `source` into `dest_dir`, returning the final path.
    pub async fn copy_item(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let target = self.transfer_target(source, dest_dir).await?;
        copy_recursive(source, &target).await?;
        Ok(target)
    }

    async fn transfer_target(
        &self,
        source: &Path,
        dest_dir: &Path,
    ) -> Result<PathBuf, BackendError> {
        let source_exists = fs::try_exists(source).await.unwrap_or(false);
        let dest_is_dir = fs::metadata(dest_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !source_exists || !dest_is_dir {
            return Err(BackendError::InvalidPath(
                "invalid source or destination".to_string(),
            ));
        }

        if dest_dir.starts_with(source) {
            return Err(BackendError::InvalidPath(format!(
                "cannot place {} inside itself",
                source.display()
            )));
        }

        let file_name = source.file_name().ok_or_else(|| {
            BackendError::InvalidPath(format!("no file name in {}", source.display()))
        })?;

        Ok(unique_path(dest_dir.join(file_name)).await)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(LocalBackendConfig::default())
    }
}

impl ThumbnailSource for LocalBackend {
    async fn read_file_base64(&self, path: &Path) -> Result<String, BackendError> {
        LocalBackend::read_file_base64(self, path).await
    }

    async fn extract_video_thumbnail(
        &self,
        path: &Path,
        size: u32,
    ) -> Result<String, BackendError> {
        LocalBackend::extract_video_thumbnail(self, path, size).await
    }
}

fn validate_name(name: &str) -> Result<(), BackendError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(BackendError::InvalidPath(format!("invalid name {name:?}")));
    }
    Ok(())
}

/// Returns `path`, or `stem (n).ext` beside it for the first free `n`.
async fn unique_path(path: PathBuf) -> PathBuf {
    if !fs::try_exists(&path).await.unwrap_or(false) {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = parent.join(format!("{stem} ({counter}){extension}"));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        counter += 1;
    }
}

async fn copy_recursive(source: &Path, target: &Path) -> Result<(), BackendError> {
    let mut stack = vec![(source.to_path_buf(), target.to_path_buf())];

    while let Some((from, to)) = stack.pop() {
        let metadata = fs::metadata(&from).await.map_err(io_error(&from))?;
        if metadata.is_dir() {
            fs::create_dir_all(&to).await.map_err(io_error(&to))?;
            let mut reader = fs::read_dir(&from).await.map_err(io_error(&from))?;
            while let Some(item) = reader.next_entry().await.map_err(io_error(&from))? {
                stack.push((item.path(), to.join(item.file_name())));
            }
        } else {
            fs::copy(&from, &to).await.map_err(io_error(&from))?;
        }
    }

    Ok(())
}
