//! DevToolkit Scheduler Library
//!
//! Bounded-concurrency thumbnail loading for file manager views.
//!
//! A [`ThumbnailLoader`] takes a directory listing, serves whatever the
//! shared [`ThumbnailCache`](devtoolkit_cache::ThumbnailCache) already holds,
//! and fetches the rest through a
//! [`ThumbnailSource`](devtoolkit_backend::ThumbnailSource) with at most
//! `max_concurrent` calls in flight. Clearing a view starts a new generation;
//! fetches from older generations never write into it.
//!
//! # Example
//!
//! ```
//! use devtoolkit_backend::FileEntry;
//! use devtoolkit_cache::{Thumbnail, ThumbnailCache};
//! use devtoolkit_scheduler::QueueState;
//!
//! let cache = ThumbnailCache::new(10);
//! cache.insert("/pics/a.png", Thumbnail::png("AAAA"));
//!
//! let mut queue = QueueState::new();
//! let listing = vec![
//!     FileEntry::file("/pics/a.png"),
//!     FileEntry::file("/pics/b.png"),
//!     FileEntry::file("/pics/notes.txt"),
//! ];
//!
//! // a.png is served from the cache, b.png needs a fetch
//! assert_eq!(queue.enqueue(&listing, &cache), 1);
//! assert!(queue.results().contains_key("a.png"));
//!
//! let tickets = queue.admit(5, &cache);
//! assert_eq!(tickets.len(), 1);
//! assert_eq!(tickets[0].item.name, "b.png");
//! ```

mod loader;
mod media;
mod queue;
mod settings;

pub use loader::ThumbnailLoader;
pub use media::{image_mime_type, MediaKind, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
pub use queue::{
    Completion, FetchTicket, Generation, QueueItem, QueueState, QueueStats, ThumbnailState,
};
pub use settings::{
    LoaderSettings, SettingsSource, SharedSettings, DEFAULT_MAX_CONCURRENT, DEFAULT_THUMBNAIL_SIZE,
};
