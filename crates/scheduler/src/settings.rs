//! Settings the loader reads on every drain.

use std::sync::{Arc, PoisonError, RwLock};

/// Default number of concurrent backend fetches.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default edge length of extracted video frames, in pixels.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 48;

/// Loader settings
///
/// Zero values mean "unset" and fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSettings {
    /// Maximum number of fetches in flight per view
    pub max_concurrent: usize,

    /// Target size passed to video frame extraction
    pub thumbnail_size: u32,
}

impl LoaderSettings {
    pub fn new(max_concurrent: usize, thumbnail_size: u32) -> Self {
        Self {
            max_concurrent,
            thumbnail_size,
        }
        .normalized()
    }

    /// Replace zero values with the defaults
    pub fn normalized(self) -> Self {
        Self {
            max_concurrent: if self.max_concurrent == 0 {
                DEFAULT_MAX_CONCURRENT
            } else {
                self.max_concurrent
            },
            thumbnail_size: if self.thumbnail_size == 0 {
                DEFAULT_THUMBNAIL_SIZE
            } else {
                self.thumbnail_size
            },
        }
    }
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }
}

/// Anything the loader can read its settings from.
pub trait SettingsSource: Send + Sync {
    /// Current settings, already normalized
    fn loader_settings(&self) -> LoaderSettings;
}

impl SettingsSource for LoaderSettings {
    fn loader_settings(&self) -> LoaderSettings {
        self.normalized()
    }
}

/// Settings that can change while loaders are running
///
/// Clones share the same value, so the settings UI can hold one handle and
/// every loader another. Changes apply from the next drain onwards.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<LoaderSettings>>,
}

impl SharedSettings {
    pub fn new(settings: LoaderSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn get(&self) -> LoaderSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, settings: LoaderSettings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Modify the settings in place
    pub fn update(&self, f: impl FnOnce(&mut LoaderSettings)) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

impl SettingsSource for SharedSettings {
    fn loader_settings(&self) -> LoaderSettings {
        self.get().normalized()
    }
}
