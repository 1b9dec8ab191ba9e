//! Thumbnail cache configuration.
//!
//! The cache capacity can be loaded from a `key = value` file, from
//! environment variables, or built programmatically.

use std::fs;
use std::io;
use std::path::Path;

use crate::thumbnail::DEFAULT_CAPACITY;

/// Environment variable overriding the cache capacity.
pub const CAPACITY_ENV_VAR: &str = "DEVTOOLKIT_THUMBNAIL_CACHE_ENTRIES";

const CAPACITY_KEY: &str = "thumbnail_cache_entries";

/// Configuration for the thumbnail cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of thumbnails kept in memory
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DEVTOOLKIT_THUMBNAIL_CACHE_ENTRIES`: number of cached thumbnails (default: 500)
    ///
    /// # Errors
    /// Returns an error if a variable is set but does not hold a valid count.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(CAPACITY_ENV_VAR) {
            config.capacity = parse_count(CAPACITY_ENV_VAR, &val)?;
        }

        Ok(config)
    }

    /// Loads configuration from a file.
    ///
    /// Expected file format:
    /// ```text
    /// # comments are allowed
    /// thumbnail_cache_entries = 500
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds an invalid value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');

                if key == CAPACITY_KEY {
                    config.capacity = parse_count(key, value)?;
                }
            }
        }

        Ok(config)
    }

    /// Saves configuration to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        format!(
            "# DevToolkit thumbnail cache configuration\n{} = {}\n",
            CAPACITY_KEY, self.capacity
        )
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
