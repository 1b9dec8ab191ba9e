//! Video frame extraction through an external FFmpeg binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::fs;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::io_error;
use crate::BackendError;

/// Install locations probed when `ffmpeg` is not on the `PATH`.
const COMMON_LOCATIONS: &[&str] = &[
    "C:\\ffmpeg\\ffmpeg.exe",
    "C:\\ffmpeg\\bin\\ffmpeg.exe",
    "C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe",
    "C:\\Program Files (x86)\\ffmpeg\\bin\\ffmpeg.exe",
    "/usr/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/opt/homebrew/bin/ffmpeg",
];

/// Find a usable FFmpeg executable.
///
/// An explicitly configured path wins and is not second-guessed; otherwise
/// `ffmpeg` on the `PATH` is tried before the common install locations.
pub(crate) async fn locate(configured: Option<&Path>) -> Result<PathBuf, BackendError> {
    if let Some(path) = configured {
        return if fs::try_exists(path).await.unwrap_or(false) {
            Ok(path.to_path_buf())
        } else {
            Err(BackendError::FfmpegNotFound)
        };
    }

    let on_path = Command::new("ffmpeg")
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok();
    if on_path {
        return Ok(PathBuf::from("ffmpeg"));
    }

    for location in COMMON_LOCATIONS {
        if fs::try_exists(location).await.unwrap_or(false) {
            return Ok(PathBuf::from(location));
        }
    }

    Err(BackendError::FfmpegNotFound)
}

/// Scale-and-pad filter producing a `size` x `size` frame.
pub(crate) fn scale_filter(size: u32) -> String {
    format!(
        "scale={size}:{size}:force_original_aspect_ratio=decrease,\
         pad={size}:{size}:(ow-iw)/2:(oh-ih)/2"
    )
}

/// Extract the first frame of `input` as PNG bytes.
pub(crate) async fn extract_first_frame(
    ffmpeg: &Path,
    input: &Path,
    size: u32,
    temp_dir: &Path,
) -> Result<Vec<u8>, BackendError> {
    fs::create_dir_all(temp_dir)
        .await
        .map_err(io_error(temp_dir))?;

    let output = temp_dir.join(format!("thumb_{}.png", Uuid::new_v4()));

    let status = Command::new(ffmpeg)
        .arg("-i")
        .arg(input)
        .args(["-vframes", "1", "-vf"])
        .arg(scale_filter(size.max(1)))
        .arg("-y")
        .arg(&output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(io_error(ffmpeg))?;

    if !status.success() {
        let _ = fs::remove_file(&output).await;
        return Err(BackendError::FrameExtraction(input.to_path_buf()));
    }

    let bytes = fs::read(&output).await.map_err(io_error(&output));
    let _ = fs::remove_file(&output).await;
    bytes
}
