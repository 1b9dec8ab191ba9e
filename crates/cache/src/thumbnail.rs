//! In-memory thumbnail cache with FIFO eviction
//!
//! Keeps rendered thumbnail payloads keyed by absolute file path so that
//! navigating back into a directory does not hit the backend again. Once the
//! entry ceiling is exceeded the oldest *inserted* entry is dropped. Reads do
//! not refresh an entry's position, so this is deliberately not an LRU.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of thumbnails retained across navigation.
pub const DEFAULT_CAPACITY: usize = 500;

/// A rendered thumbnail payload
///
/// The payload is kept exactly as the backend returned it (base64 text)
/// together with the MIME type it should be displayed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// MIME type of the decoded image, e.g. `image/png`
    pub mime_type: String,

    /// Base64 encoded image bytes
    pub base64: String,
}

impl Thumbnail {
    /// Create a new thumbnail payload
    pub fn new(mime_type: impl Into<String>, base64: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: base64.into(),
        }
    }

    /// Create a PNG payload, the format video frame extraction produces
    pub fn png(base64: impl Into<String>) -> Self {
        Self::new("image/png", base64)
    }

    /// Render the payload as a `data:` URL
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }

    /// Approximate size of the decoded image in bytes
    pub fn decoded_len(&self) -> usize {
        let padding = self.base64.bytes().rev().take_while(|&b| b == b'=').count();
        (self.base64.len() / 4 * 3).saturating_sub(padding)
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of thumbnails currently cached
    pub entry_count: usize,

    /// Maximum number of thumbnails retained
    pub capacity: usize,

    /// Number of successful inserts (including overwrites)
    pub insertions: u64,

    /// Number of entries dropped to stay within capacity
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of the capacity in use (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.entry_count as f64 / self.capacity as f64
        }
    }
}

struct CacheState {
    entries: HashMap<PathBuf, Arc<Thumbnail>>,

    /// Insertion order, oldest at the front
    order: VecDeque<PathBuf>,

    capacity: usize,

    stats: CacheStats,
}

impl CacheState {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    fn evict_oldest(&mut self) -> Option<PathBuf> {
        while let Some(path) = self.order.pop_front() {
            if self.entries.remove(&path).is_some() {
                self.stats.evictions += 1;
                return Some(path);
            }
        }
        None
    }

    fn evict_to_fit(&mut self) -> Vec<PathBuf> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            match self.evict_oldest() {
                Some(path) => evicted.push(path),
                None => break,
            }
        }
        self.stats.entry_count = self.entries.len();
        evicted
    }
}

/// Process-wide thumbnail cache
///
/// A cheap, cloneable handle: every clone refers to the same entries. The
/// application constructs one at startup and hands clones to each directory
/// view; tests construct their own with whatever capacity they need.
///
/// # Example
///
/// ```
/// use devtoolkit_cache::{Thumbnail, ThumbnailCache};
///
/// let cache = ThumbnailCache::new(2);
/// cache.insert("/pics/a.png", Thumbnail::new("image/png", "AAAA"));
/// cache.insert("/pics/b.png", Thumbnail::new("image/png", "BBBB"));
/// cache.insert("/pics/c.png", Thumbnail::new("image/png", "CCCC"));
///
/// // The first insert is gone, regardless of how often it was read.
/// assert!(cache.lookup("/pics/a.png").is_none());
/// assert_eq!(cache.size(), 2);
/// ```
#[derive(Clone)]
pub struct ThumbnailCache {
    state: Arc<Mutex<CacheState>>,
}

impl ThumbnailCache {
    /// Create a cache retaining at most `capacity` thumbnails
    ///
    /// A capacity of zero is accepted and retains nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the thumbnail cached for `path`
    ///
    /// Does not affect eviction order.
    pub fn lookup(&self, path: impl AsRef<Path>) -> Option<Arc<Thumbnail>> {
        self.lock().entries.get(path.as_ref()).cloned()
    }

    /// Check whether `path` has a cached thumbnail
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock().entries.contains_key(path.as_ref())
    }

    /// Store a thumbnail for `path`
    ///
    /// Overwriting an existing entry replaces the payload but keeps the
    /// entry's original position in the eviction order. Returns the path that
    /// was evicted to make room, if any.
    pub fn insert(
        &self,
        path: impl Into<PathBuf>,
        thumbnail: impl Into<Arc<Thumbnail>>,
    ) -> Option<PathBuf> {
        let path = path.into();
        let mut state = self.lock();
        state.stats.insertions += 1;

        if state.capacity == 0 {
            state.stats.evictions += 1;
            log::debug!("thumbnail cache has no capacity, dropped {}", path.display());
            return Some(path);
        }

        if state.entries.insert(path.clone(), thumbnail.into()).is_none() {
            state.order.push_back(path);
        }

        // New keys sit at the back, so the front is never the one just inserted.
        let evicted = state.evict_to_fit().into_iter().next();
        if let Some(evicted) = &evicted {
            log::debug!("evicted cached thumbnail {}", evicted.display());
        }
        evicted
    }

    /// Remove the thumbnail for `path`
    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Arc<Thumbnail>> {
        let path = path.as_ref();
        let mut state = self.lock();
        let removed = state.entries.remove(path)?;
        state.order.retain(|p| p != path);
        state.stats.entry_count = state.entries.len();
        Some(removed)
    }

    /// Drop every cached thumbnail
    ///
    /// Only an explicit user action should call this; navigating between
    /// directories never does.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.stats.entry_count = 0;
    }

    /// Number of cached thumbnails
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Maximum number of thumbnails retained
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Change the capacity, evicting oldest entries if it shrank
    ///
    /// Returns the evicted paths, oldest first.
    pub fn set_capacity(&self, capacity: usize) -> Vec<PathBuf> {
        let mut state = self.lock();
        state.capacity = capacity;
        state.stats.capacity = capacity;
        state.evict_to_fit()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ThumbnailCache")
            .field("entries", &state.entries.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}
