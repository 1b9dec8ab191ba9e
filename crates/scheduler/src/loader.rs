//! Thumbnail loader for a directory view.
//!
//! Drives a [`QueueState`] against a [`ThumbnailSource`]: each admitted item
//! becomes a task on the tokio runtime, and every finished task writes its
//! result and tops the queue back up, so the view keeps loading until
//! nothing is pending.
//!
//! Queue bookkeeping happens under a mutex that is never held across an
//! await; the only suspension point is the backend call itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use devtoolkit_backend::{BackendError, FileEntry, ThumbnailSource};
use devtoolkit_cache::{Thumbnail, ThumbnailCache};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::media::{image_mime_type, MediaKind};
use crate::queue::{
    Completion, FetchTicket, QueueItem, QueueState, QueueStats, ThumbnailState,
};
use crate::settings::{LoaderSettings, SettingsSource};

/// Loads thumbnails for one directory view with bounded concurrency.
///
/// Cloning gives another handle to the same view.
///
/// # Example
///
/// ```no_run
/// use devtoolkit_backend::LocalBackend;
/// use devtoolkit_cache::ThumbnailCache;
/// use devtoolkit_scheduler::{LoaderSettings, ThumbnailLoader};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn demo() -> Result<(), devtoolkit_backend::BackendError> {
/// let backend = Arc::new(LocalBackend::default());
/// let cache = ThumbnailCache::default();
/// let loader = ThumbnailLoader::new(
///     backend.clone(),
///     cache,
///     Arc::new(LoaderSettings::default()),
///     tokio::runtime::Handle::current(),
/// );
///
/// let listing = backend.read_directory(Path::new("/home/me/Pictures")).await?;
/// loader.queue_thumbnails(&listing);
/// loader.wait_idle().await;
///
/// for (name, thumbnail) in loader.thumbnails() {
///     println!("{name}: {}", thumbnail.mime_type);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ThumbnailLoader<S: ThumbnailSource> {
    shared: Arc<Shared<S>>,
}

impl<S: ThumbnailSource> Clone for ThumbnailLoader<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<S> {
    state: Mutex<QueueState>,
    cache: ThumbnailCache,
    source: Arc<S>,
    settings: Arc<dyn SettingsSource>,
    runtime: Handle,
    updates: watch::Sender<ThumbnailState>,
}

impl<S: ThumbnailSource> ThumbnailLoader<S> {
    /// Create a loader for a fresh view
    ///
    /// `cache` is the application-wide cache handle; fetches are spawned on
    /// `runtime`.
    pub fn new(
        source: Arc<S>,
        cache: ThumbnailCache,
        settings: Arc<dyn SettingsSource>,
        runtime: Handle,
    ) -> Self {
        let (updates, _) = watch::channel(ThumbnailState::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                cache,
                source,
                settings,
                runtime,
                updates,
            }),
        }
    }

    /// Show thumbnails for a new listing
    ///
    /// Cached entries appear in [`Self::thumbnails`] before this returns;
    /// the rest are fetched in listing order, at most `max_concurrent` at a
    /// time. Anything still pending from the previous listing is dropped.
    pub fn queue_thumbnails(&self, entries: &[FileEntry]) {
        {
            let mut state = self.shared.lock();
            let queued = state.enqueue(entries, &self.shared.cache);
            log::info!(
                "queued {queued} thumbnails, {} served from cache",
                state.results().len()
            );
            self.shared.publish(&state);
        }
        self.shared.process_queue();
    }

    /// Admit pending entries up to the current concurrency limit
    ///
    /// Runs automatically after queueing and after each fetch; call it
    /// directly to apply a raised limit without waiting for a completion.
    pub fn process_queue(&self) {
        self.shared.process_queue();
    }

    /// Reset the view
    ///
    /// Pending entries are dropped and the results emptied. Fetches already
    /// running are not interrupted, but whatever they return is kept out of
    /// this view. The global cache is left alone.
    pub fn clear_thumbnails(&self) {
        let mut state = self.shared.lock();
        state.clear();
        log::debug!("thumbnail view cleared, generation {}", state.generation());
        self.shared.publish(&state);
    }

    /// Loaded thumbnails by display name
    pub fn thumbnails(&self) -> HashMap<String, Arc<Thumbnail>> {
        self.shared.lock().results().clone()
    }

    pub fn thumbnail(&self, name: &str) -> Option<Arc<Thumbnail>> {
        self.shared.lock().results().get(name).cloned()
    }

    /// Current view state
    pub fn state(&self) -> ThumbnailState {
        self.shared.lock().snapshot()
    }

    /// Receive a fresh [`ThumbnailState`] after every change
    pub fn subscribe(&self) -> watch::Receiver<ThumbnailState> {
        self.shared.updates.subscribe()
    }

    /// Wait until nothing is pending or loading for the current view
    pub async fn wait_idle(&self) {
        let mut updates = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = updates.wait_for(ThumbnailState::is_idle).await;
    }

    pub fn active_loads(&self) -> usize {
        self.shared.lock().active_loads()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().pending_len()
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats()
    }

    /// Settings as the next drain will see them
    pub fn settings(&self) -> LoaderSettings {
        self.shared.settings.loader_settings()
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.settings().thumbnail_size
    }

    pub fn max_concurrent(&self) -> usize {
        self.settings().max_concurrent
    }

    /// Empty the global cache; this view's results are kept
    pub fn clear_global_cache(&self) {
        self.shared.cache.clear();
    }

    pub fn global_cache_size(&self) -> usize {
        self.shared.cache.size()
    }
}

impl<S: ThumbnailSource> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &QueueState) {
        self.updates.send_replace(state.snapshot());
    }

    fn process_queue(self: &Arc<Self>) {
        let settings = self.settings.loader_settings();

        let tickets = {
            let mut state = self.lock();
            let tickets = state.admit(settings.max_concurrent, &self.cache);
            self.publish(&state);
            tickets
        };

        for ticket in tickets {
            let shared = Arc::clone(self);
            self.runtime
                .spawn(shared.load_thumbnail(ticket, settings.thumbnail_size));
        }
    }

    async fn load_thumbnail(self: Arc<Self>, ticket: FetchTicket, size: u32) {
        let item = &ticket.item;

        // The backend call runs as its own task so a panicking source still
        // releases the slot below.
        let fetch = self
            .runtime
            .spawn(fetch_thumbnail(Arc::clone(&self.source), item.clone(), size));

        let thumbnail = match fetch.await {
            Ok(Ok(thumbnail)) => {
                let thumbnail = Arc::new(thumbnail);
                self.cache.insert(item.path.clone(), Arc::clone(&thumbnail));
                Some(thumbnail)
            }
            Ok(Err(err)) => {
                log::warn!("failed to load thumbnail for {}: {err}", item.name);
                None
            }
            Err(err) => {
                log::warn!("thumbnail fetch for {} aborted: {err}", item.name);
                None
            }
        };

        let completion = {
            let mut state = self.lock();
            let completion = state.complete(&ticket, thumbnail);
            self.publish(&state);
            completion
        };

        match completion {
            Completion::Stale => log::debug!(
                "discarded thumbnail for {} from cleared generation {}",
                item.name,
                ticket.generation
            ),
            Completion::Detached => {
                log::debug!("{} is no longer listed, result kept in cache only", item.name)
            }
            Completion::Stored | Completion::Failed => {}
        }

        self.process_queue();
    }
}

async fn fetch_thumbnail<S: ThumbnailSource>(
    source: Arc<S>,
    item: QueueItem,
    size: u32,
) -> Result<Thumbnail, BackendError> {
    match item.kind {
        MediaKind::Video => source
            .extract_video_thumbnail(&item.path, size)
            .await
            .map(Thumbnail::png),
        MediaKind::Image => source
            .read_file_base64(&item.path)
            .await
            .map(|base64| Thumbnail::new(image_mime_type(&item.name), base64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SharedSettings;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Scripted backend recording how it was called.
    #[derive(Default)]
    struct MockSource {
        /// When set, every call waits for a permit before answering
        gate: Option<Arc<Semaphore>>,
        failing: HashSet<PathBuf>,
        panicking: HashSet<PathBuf>,
        calls: Mutex<Vec<PathBuf>>,
        video_sizes: Mutex<Vec<u32>>,
        current: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl MockSource {
        fn gated(gate: &Arc<Semaphore>) -> Self {
            Self {
                gate: Some(Arc::clone(gate)),
                ..Default::default()
            }
        }

        fn failing_on(path: &str) -> Self {
            Self {
                failing: HashSet::from([PathBuf::from(path)]),
                ..Default::default()
            }
        }

        fn panicking_on(path: &str) -> Self {
            Self {
                panicking: HashSet::from([PathBuf::from(path)]),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().clone()
        }

        async fn respond(&self, path: &Path) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            match &self.gate {
                Some(gate) => gate.acquire().await.unwrap().forget(),
                None => tokio::task::yield_now().await,
            }

            self.current.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);

            if self.panicking.contains(path) {
                panic!("decoder crashed on {}", path.display());
            }

            if self.failing.contains(path) {
                Err(BackendError::Rejected(format!("cannot decode {}", path.display())))
            } else {
                Ok(format!("payload:{}", path.display()))
            }
        }
    }

    impl ThumbnailSource for MockSource {
        async fn read_file_base64(&self, path: &Path) -> Result<String, BackendError> {
            self.respond(path).await
        }

        async fn extract_video_thumbnail(
            &self,
            path: &Path,
            size: u32,
        ) -> Result<String, BackendError> {
            self.video_sizes.lock().unwrap().push(size);
            self.respond(path).await
        }
    }

    fn files(dir: &str, names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .map(|name| FileEntry::file(format!("{dir}/{name}")))
            .collect()
    }

    fn loader_with(
        source: &Arc<MockSource>,
        cache: &ThumbnailCache,
        settings: Arc<dyn SettingsSource>,
    ) -> ThumbnailLoader<MockSource> {
        ThumbnailLoader::new(Arc::clone(source), cache.clone(), settings, Handle::current())
    }

    fn loader(
        source: &Arc<MockSource>,
        cache: &ThumbnailCache,
        max: usize,
    ) -> ThumbnailLoader<MockSource> {
        loader_with(source, cache, Arc::new(LoaderSettings::new(max, 48)))
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    async fn idle(loader: &ThumbnailLoader<MockSource>) {
        tokio::time::timeout(Duration::from_secs(5), loader.wait_idle())
            .await
            .expect("loader did not become idle");
    }

    const FIVE: &[&str] = &["1.png", "2.png", "3.png", "4.png", "5.png"];

    #[tokio::test]
    async fn all_cache_hits_are_served_synchronously() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(10);
        for name in ["a.png", "b.jpg", "c.mp4"] {
            cache.insert(format!("/pics/{name}"), Thumbnail::png(name));
        }
        let loader = loader(&source, &cache, 2);

        let mut listing = files("/pics", &["a.png", "b.jpg", "c.mp4", "notes.txt"]);
        listing.push(FileEntry::directory("/pics/raw"));
        loader.queue_thumbnails(&listing);

        // No await between queueing and checking.
        assert_eq!(loader.thumbnails().len(), 3);
        assert_eq!(loader.pending_len(), 0);
        assert_eq!(loader.active_loads(), 0);
        assert!(loader.state().is_idle());

        tokio::task::yield_now().await;
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrency_stays_within_limit() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::gated(&gate));
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 2);

        loader.queue_thumbnails(&files("/pics", FIVE));
        eventually(|| source.calls().len() == 2).await;

        assert_eq!(loader.active_loads(), 2);
        assert_eq!(loader.pending_len(), 3);
        assert_eq!(loader.state().loading.len(), 2);

        // Release one fetch at a time and check the budget after each.
        for released in 1..=5 {
            gate.add_permits(1);
            eventually(|| source.finished.load(Ordering::SeqCst) == released).await;
            assert!(loader.active_loads() <= 2);
            assert!(source.current.load(Ordering::SeqCst) <= 2);
        }

        idle(&loader).await;
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
        assert_eq!(loader.thumbnails().len(), 5);

        let calls = source.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls.iter().collect::<HashSet<_>>().len(), 5);
    }

    #[tokio::test]
    async fn fetches_start_in_listing_order() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 1);

        loader.queue_thumbnails(&files("/pics", FIVE));
        idle(&loader).await;

        let expected: Vec<PathBuf> = FIVE
            .iter()
            .map(|n| PathBuf::from(format!("/pics/{n}")))
            .collect();
        assert_eq!(source.calls(), expected);
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped() {
        let source = Arc::new(MockSource::failing_on("/pics/3.png"));
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 2);

        loader.queue_thumbnails(&files("/pics", FIVE));
        idle(&loader).await;

        let thumbnails = loader.thumbnails();
        assert_eq!(thumbnails.len(), 4);
        assert!(!thumbnails.contains_key("3.png"));
        assert_eq!(loader.active_loads(), 0);
        assert!(loader.state().loading.is_empty());
        assert_eq!(loader.stats().failed, 1);
        assert_eq!(loader.stats().fetched, 4);
        assert!(!cache.contains("/pics/3.png"));
        assert_eq!(source.calls().len(), 5);
    }

    #[tokio::test]
    async fn panicking_fetch_releases_its_slot() {
        let source = Arc::new(MockSource::panicking_on("/pics/bad.png"));
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 1);

        loader.queue_thumbnails(&files("/pics", &["bad.png", "a.png", "b.png"]));
        idle(&loader).await;

        let thumbnails = loader.thumbnails();
        assert_eq!(thumbnails.len(), 2);
        assert!(!thumbnails.contains_key("bad.png"));
        assert_eq!(loader.active_loads(), 0);
        assert_eq!(loader.pending_len(), 0);
        assert_eq!(loader.stats().failed, 1);
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn queueing_twice_does_not_fetch_twice() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::gated(&gate));
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 2);
        let listing = files("/pics", FIVE);

        loader.queue_thumbnails(&listing);
        eventually(|| source.calls().len() == 2).await;
        loader.queue_thumbnails(&listing);

        gate.add_permits(10);
        idle(&loader).await;

        assert_eq!(source.calls().len(), 5);
        let names: HashSet<String> = loader.thumbnails().into_keys().collect();
        let expected: HashSet<String> = FIVE.iter().map(|n| n.to_string()).collect();
        assert_eq!(names, expected);
        assert!(loader.stats().duplicates >= 1);
    }

    #[tokio::test]
    async fn clear_mid_drain_keeps_late_results_out() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::gated(&gate));
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 2);

        loader.queue_thumbnails(&files("/old", FIVE));
        eventually(|| source.calls().len() == 2).await;

        loader.clear_thumbnails();
        assert_eq!(loader.pending_len(), 0);
        assert_eq!(loader.active_loads(), 0);
        assert!(loader.thumbnails().is_empty());
        assert_eq!(loader.state().generation, 1);

        loader.queue_thumbnails(&files("/new", &["1.png"]));
        eventually(|| source.calls().len() == 3).await;

        gate.add_permits(10);
        eventually(|| source.finished.load(Ordering::SeqCst) == 3).await;
        idle(&loader).await;

        let thumbnails = loader.thumbnails();
        assert_eq!(thumbnails.len(), 1);
        assert_eq!(thumbnails["1.png"].base64, "payload:/new/1.png");
        assert_eq!(loader.active_loads(), 0);
        eventually(|| loader.stats().stale == 2).await;

        // Dropped pending entries were never fetched; late results still
        // reached the path-keyed cache.
        assert_eq!(source.calls().len(), 3);
        assert!(cache.contains("/old/1.png"));
        assert!(cache.contains("/old/2.png"));
        assert!(!cache.contains("/old/3.png"));
    }

    #[tokio::test]
    async fn videos_use_frame_extraction() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(10);
        let loader = loader_with(&source, &cache, Arc::new(LoaderSettings::new(3, 96)));

        loader.queue_thumbnails(&files("/media", &["clip.MOV", "logo.svg", "photo.jpeg"]));
        idle(&loader).await;

        let thumbnails = loader.thumbnails();
        assert_eq!(thumbnails["clip.MOV"].mime_type, "image/png");
        assert_eq!(thumbnails["logo.svg"].mime_type, "image/svg+xml");
        assert_eq!(thumbnails["photo.jpeg"].mime_type, "image/jpeg");
        assert_eq!(*source.video_sizes.lock().unwrap(), vec![96]);
        assert_eq!(loader.thumbnail_size(), 96);
    }

    #[tokio::test]
    async fn raised_limit_applies_on_next_drain() {
        let gate = Arc::new(Semaphore::new(0));
        let source = Arc::new(MockSource::gated(&gate));
        let cache = ThumbnailCache::new(10);
        let settings = SharedSettings::new(LoaderSettings::new(1, 48));
        let loader = loader_with(&source, &cache, Arc::new(settings.clone()));

        loader.queue_thumbnails(&files("/pics", FIVE));
        eventually(|| source.calls().len() == 1).await;
        assert_eq!(loader.active_loads(), 1);

        settings.update(|s| s.max_concurrent = 3);
        assert_eq!(loader.max_concurrent(), 3);
        loader.process_queue();
        eventually(|| source.calls().len() == 3).await;
        assert_eq!(loader.active_loads(), 3);

        gate.add_permits(10);
        idle(&loader).await;
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);
        assert_eq!(loader.thumbnails().len(), 5);
    }

    #[tokio::test]
    async fn view_results_outlive_cache_eviction() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(2);
        let loader = loader(&source, &cache, 5);

        loader.queue_thumbnails(&files("/pics", FIVE));
        idle(&loader).await;

        assert_eq!(loader.thumbnails().len(), 5);
        assert_eq!(loader.global_cache_size(), 2);

        loader.clear_global_cache();
        assert_eq!(loader.global_cache_size(), 0);
        assert_eq!(loader.thumbnails().len(), 5);
    }

    #[tokio::test]
    async fn returning_to_a_directory_hits_the_cache() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(10);
        let first_view = loader(&source, &cache, 2);
        first_view.queue_thumbnails(&files("/pics", FIVE));
        idle(&first_view).await;

        let second_view = loader(&source, &cache, 2);
        second_view.queue_thumbnails(&files("/pics", FIVE));

        assert_eq!(second_view.thumbnails().len(), 5);
        assert_eq!(second_view.stats().cache_hits, 5);
        assert_eq!(source.calls().len(), 5);
    }

    #[tokio::test]
    async fn subscribers_see_progress() {
        let source = Arc::new(MockSource::default());
        let cache = ThumbnailCache::new(10);
        let loader = loader(&source, &cache, 2);
        let mut updates = loader.subscribe();

        loader.queue_thumbnails(&files("/pics", &["a.png", "b.png"]));
        assert!(updates.has_changed().unwrap());

        idle(&loader).await;
        let state = updates.borrow_and_update().clone();
        assert!(state.is_idle());
        assert_eq!(state.thumbnails.len(), 2);
        assert_eq!(state.stats.fetched, 2);
    }
}
