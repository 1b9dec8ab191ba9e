use std::future::Future;
use std::path::Path;

use crate::BackendError;

/// The two backend calls thumbnail loading depends on.
///
/// Both return the image bytes base64 encoded. Implementations are shared
/// between concurrently running fetches, and the returned futures are spawned
/// onto the runtime, hence the `Send` bounds.
pub trait ThumbnailSource: Send + Sync + 'static {
    /// `read_file_base64`: raw bytes of an image file
    fn read_file_base64(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    /// `extract_video_thumbnail`: a PNG frame scaled to fit `size` x `size`
    fn extract_video_thumbnail(
        &self,
        path: &Path,
        size: u32,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}
