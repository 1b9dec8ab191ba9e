//! DevToolkit Backend Library
//!
//! The backend RPC surface the desktop shell calls into: directory listing,
//! file reads and mutations, and video frame extraction.
//!
//! Thumbnail loading only depends on the narrow [`ThumbnailSource`] trait,
//! so tests and alternative transports can stand in for [`LocalBackend`].
//!
//! # Example
//!
//! ```no_run
//! use devtoolkit_backend::LocalBackend;
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), devtoolkit_backend::BackendError> {
//! let backend = LocalBackend::default();
//! for entry in backend.read_directory(Path::new("/home/me/Pictures")).await? {
//!     println!("{} ({})", entry.name, if entry.is_dir { "dir" } else { "file" });
//! }
//! # Ok(())
//! # }
//! ```

mod entry;
mod error;
mod ffmpeg;
mod local;
mod source;

pub use entry::{display_name, extension_of, FileEntry};
pub use error::BackendError;
pub use local::{LocalBackend, LocalBackendConfig, FFMPEG_ENV_VAR, MAX_FILE_BYTES_ENV_VAR};
pub use source::ThumbnailSource;
