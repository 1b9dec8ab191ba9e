//! Per-view thumbnail queue state
//!
//! Pure bookkeeping with no I/O: which entries are pending, which are being
//! fetched, what has been loaded, and how much of the concurrency budget is
//! in use. [`crate::ThumbnailLoader`] wraps this in a mutex and drives the
//! actual backend calls.
//!
//! Each item moves `pending → in flight → {loaded, failed}`. A failed item
//! is not retried for the rest of the visit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use devtoolkit_backend::FileEntry;
use devtoolkit_cache::{Thumbnail, ThumbnailCache};

use crate::media::MediaKind;

/// Identifies one view state; bumped every time the view is cleared.
pub type Generation = u64;

/// An entry waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Absolute path, the global cache key
    pub path: PathBuf,

    /// Display name, the key in the view's results
    pub name: String,

    pub kind: MediaKind,
}

/// Permission to run one backend fetch
///
/// Carries the generation it was admitted under so a completion arriving
/// after the view was cleared can be recognised and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub item: QueueItem,
    pub generation: Generation,
}

/// Outcome of reporting a finished fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Written into the view's results
    Stored,

    /// Fetched, but the entry is no longer part of the current listing
    Detached,

    /// The backend call failed
    Failed,

    /// Belongs to a generation that has since been cleared
    Stale,
}

/// Per-view counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Entries that needed a fetch when queued
    pub queued: u64,

    /// Entries served from the global cache
    pub cache_hits: u64,

    /// Successful backend fetches
    pub fetched: u64,

    /// Failed backend fetches
    pub failed: u64,

    /// Admissions dropped because the same entry was already in flight
    pub duplicates: u64,

    /// Completions discarded because the view was cleared
    pub stale: u64,
}

/// Snapshot of a view's thumbnail state, as published to observers
#[derive(Debug, Clone, Default)]
pub struct ThumbnailState {
    pub generation: Generation,

    /// Loaded thumbnails by display name
    pub thumbnails: HashMap<String, Arc<Thumbnail>>,

    /// Display names currently being fetched
    pub loading: HashSet<String>,

    /// Number of entries waiting for a fetch slot
    pub pending: usize,

    pub active_loads: usize,

    pub stats: QueueStats,
}

impl ThumbnailState {
    /// Nothing pending and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active_loads == 0
    }
}

/// Queue bookkeeping for one directory view
#[derive(Debug, Default)]
pub struct QueueState {
    generation: Generation,
    pending: VecDeque<QueueItem>,

    /// Eligible entries of the current listing, name to path
    listing: HashMap<String, PathBuf>,

    /// Entries being fetched, name to path
    in_flight: HashMap<String, PathBuf>,

    results: HashMap<String, Arc<Thumbnail>>,
    active_loads: usize,
    stats: QueueStats,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing
    ///
    /// Drops whatever was still pending, seeds the results with cache hits
    /// and queues the misses in listing order. Fetches already in flight keep
    /// running and stay tracked. Returns the number of entries queued.
    pub fn enqueue(&mut self, entries: &[FileEntry], cache: &ThumbnailCache) -> usize {
        self.pending.clear();
        self.listing.clear();
        self.results.clear();

        for entry in entries {
            let Some(kind) = MediaKind::of(entry) else {
                continue;
            };

            self.listing.insert(entry.name.clone(), entry.path.clone());

            if let Some(hit) = cache.lookup(&entry.path) {
                self.results.insert(entry.name.clone(), hit);
                self.stats.cache_hits += 1;
            } else {
                self.pending.push_back(QueueItem {
                    path: entry.path.clone(),
                    name: entry.name.clone(),
                    kind,
                });
                self.stats.queued += 1;
            }
        }

        self.pending.len()
    }

    /// Admit pending entries while the budget allows
    ///
    /// Entries are taken in FIFO order. An entry already in flight for the
    /// same path is dropped, and one whose path reached the cache since it was
    /// queued is served from there; both give their slot straight back.
    pub fn admit(&mut self, max_concurrent: usize, cache: &ThumbnailCache) -> Vec<FetchTicket> {
        let mut tickets = Vec::new();

        while self.active_loads < max_concurrent {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            self.active_loads += 1;

            if self.in_flight.get(&item.name) == Some(&item.path) {
                self.active_loads -= 1;
                self.stats.duplicates += 1;
                continue;
            }

            if let Some(hit) = cache.lookup(&item.path) {
                self.active_loads -= 1;
                self.stats.cache_hits += 1;
                self.results.insert(item.name, hit);
                continue;
            }

            self.in_flight.insert(item.name.clone(), item.path.clone());
            tickets.push(FetchTicket {
                item,
                generation: self.generation,
            });
        }

        tickets
    }

    /// Report a finished fetch; `None` means the backend call failed
    ///
    /// Releases the ticket's slot unless the ticket is stale, in which case
    /// nothing in this state is touched.
    pub fn complete(
        &mut self,
        ticket: &FetchTicket,
        thumbnail: Option<Arc<Thumbnail>>,
    ) -> Completion {
        if ticket.generation != self.generation {
            self.stats.stale += 1;
            return Completion::Stale;
        }

        debug_assert!(self.active_loads > 0, "completion without a matching admission");
        self.active_loads = self.active_loads.saturating_sub(1);

        let item = &ticket.item;
        if self.in_flight.get(&item.name) == Some(&item.path) {
            self.in_flight.remove(&item.name);
        }

        let Some(thumbnail) = thumbnail else {
            self.stats.failed += 1;
            return Completion::Failed;
        };
        self.stats.fetched += 1;

        if self.listing.get(&item.name) == Some(&item.path) {
            self.results.insert(item.name.clone(), thumbnail);
            Completion::Stored
        } else {
            Completion::Detached
        }
    }

    /// Forget everything about the current view and start a new generation
    pub fn clear(&mut self) {
        self.generation += 1;
        self.pending.clear();
        self.listing.clear();
        self.in_flight.clear();
        self.results.clear();
        self.active_loads = 0;
        self.stats = QueueStats::default();
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_loads(&self) -> usize {
        self.active_loads
    }

    pub fn is_in_flight(&self, name: &str) -> bool {
        self.in_flight.contains_key(name)
    }

    pub fn results(&self) -> &HashMap<String, Arc<Thumbnail>> {
        &self.results
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active_loads == 0
    }

    pub fn snapshot(&self) -> ThumbnailState {
        ThumbnailState {
            generation: self.generation,
            thumbnails: self.results.clone(),
            loading: self.in_flight.keys().cloned().collect(),
            pending: self.pending.len(),
            active_loads: self.active_loads,
            stats: self.stats,
        }
    }
}
