//! DevToolkit Cache Library
//!
//! In-memory thumbnail cache shared by every directory view, with FIFO
//! eviction and a small configuration layer.

pub mod config;
pub mod thumbnail;

pub use config::{CacheConfig, ConfigError};
pub use thumbnail::{CacheStats, Thumbnail, ThumbnailCache, DEFAULT_CAPACITY};
