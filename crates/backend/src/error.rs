use std::io;
use std::path::{Path, PathBuf};

/// Errors returned by backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path:?} is {size} bytes, above the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidConfig { key: String, value: String },

    #[error("FFmpeg not found; install it or set DEVTOOLKIT_FFMPEG")]
    FfmpegNotFound,

    #[error("failed to extract a video frame from {}", .0.display())]
    FrameExtraction(PathBuf),

    /// A remote or scripted backend refused the call.
    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(io::Error) -> BackendError + '_ {
    move |source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    }
}
