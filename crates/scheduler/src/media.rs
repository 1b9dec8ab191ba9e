//! Which listing entries get a thumbnail, and how their payload is tagged.

use devtoolkit_backend::{extension_of, FileEntry};

/// Image extensions shown as thumbnails.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico"];

/// Video extensions, previewed through frame extraction.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov", "avi", "mkv", "m4v"];

/// Kind of previewable media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Read the file bytes directly
    Image,

    /// Ask the backend for a PNG frame
    Video,
}

impl MediaKind {
    /// Classify a file name by extension (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = extension_of(name)?;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Classify a listing entry; directories are never eligible
    pub fn of(entry: &FileEntry) -> Option<Self> {
        if entry.is_dir {
            None
        } else {
            Self::from_name(&entry.name)
        }
    }
}

/// MIME type for an image file read verbatim.
///
/// Names without an extension never reach the loader; direct callers get
/// `application/octet-stream` for them.
pub fn image_mime_type(name: &str) -> String {
    match extension_of(name) {
        Some(ext) if ext == "svg" => "image/svg+xml".to_string(),
        Some(ext) => format!("image/{ext}"),
        None => "application/octet-stream".to_string(),
    }
}
