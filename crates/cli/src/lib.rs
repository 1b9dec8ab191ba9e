use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devtoolkit_backend::{FileEntry, LocalBackend, LocalBackendConfig};
use devtoolkit_cache::{CacheConfig, ThumbnailCache};
use devtoolkit_scheduler::{LoaderSettings, MediaKind, QueueStats, ThumbnailLoader};
use devtoolkit_storage::{FileSettings, Storage};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "devtoolkit")]
#[command(about = "DevToolkit file manager CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List a directory as JSON.
    Ls {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Load thumbnails for every image and video in a directory.
    Thumbs {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,
        #[arg(long, value_name = "N")]
        size: Option<u32>,
        #[arg(long, value_name = "N")]
        cache_entries: Option<usize>,
    },
    /// Show or change persisted file manager settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long, value_name = "N")]
        max_concurrent: Option<usize>,
        #[arg(long, value_name = "N")]
        size: Option<u32>,
    },
}

#[derive(Debug, Serialize)]
struct ThumbsOutput {
    directory: String,
    eligible: usize,
    loaded: Vec<LoadedOutput>,
    failed: Vec<String>,
    stats: StatsOutput,
    cache_entries: usize,
}

#[derive(Debug, Serialize)]
struct LoadedOutput {
    name: String,
    mime_type: String,
    bytes: usize,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    queued: u64,
    cache_hits: u64,
    fetched: u64,
    failed: u64,
    duplicates: u64,
    stale: u64,
}

impl From<QueueStats> for StatsOutput {
    fn from(stats: QueueStats) -> Self {
        Self {
            queued: stats.queued,
            cache_hits: stats.cache_hits,
            fetched: stats.fetched,
            failed: stats.failed,
            duplicates: stats.duplicates,
            stale: stats.stale,
        }
    }
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Ls { dir } => run_ls(&dir),
        Commands::Thumbs { dir, max_concurrent, size, cache_entries } => {
            run_thumbs(&dir, max_concurrent, size, cache_entries)
        }
        Commands::Settings { action } => run_settings(action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn backend() -> Result<LocalBackend> {
    let config = LocalBackendConfig::from_env().context("invalid backend configuration")?;
    Ok(LocalBackend::new(config))
}

fn storage() -> Result<Storage> {
    Storage::from_env().context("failed to locate settings directory")
}

fn run_ls(dir: &Path) -> Result<()> {
    ensure_directory_exists(dir)?;

    let backend = backend()?;
    let entries = runtime()?
        .block_on(backend.read_directory(dir))
        .with_context(|| format!("failed to list {}", dir.display()))?;

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run_thumbs(
    dir: &Path,
    max_concurrent: Option<usize>,
    size: Option<u32>,
    cache_entries: Option<usize>,
) -> Result<()> {
    ensure_directory_exists(dir)?;

    let stored = storage()?.load_settings().context("failed to load settings")?;
    let settings = LoaderSettings::new(
        max_concurrent.unwrap_or(stored.file_max_concurrent_thumbnails),
        size.unwrap_or(stored.file_thumbnail_size),
    );

    let mut cache_config = CacheConfig::from_env().context("invalid cache configuration")?;
    if let Some(capacity) = cache_entries {
        cache_config = cache_config.with_capacity(capacity);
    }
    let cache = ThumbnailCache::new(cache_config.capacity);
    let backend = Arc::new(backend()?);

    log::info!(
        "loading thumbnails for {} with {} concurrent fetches",
        dir.display(),
        settings.max_concurrent
    );

    let runtime = runtime()?;
    let (entries, loader) = runtime.block_on(async {
        let entries = backend
            .read_directory(dir)
            .await
            .with_context(|| format!("failed to list {}", dir.display()))?;

        let loader = ThumbnailLoader::new(
            Arc::clone(&backend),
            cache.clone(),
            Arc::new(settings),
            tokio::runtime::Handle::current(),
        );
        loader.queue_thumbnails(&entries);
        loader.wait_idle().await;

        anyhow::Ok((entries, loader))
    })?;

    let payload = summarize(dir, &entries, &loader);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn summarize(
    dir: &Path,
    entries: &[FileEntry],
    loader: &ThumbnailLoader<LocalBackend>,
) -> ThumbsOutput {
    let thumbnails = loader.thumbnails();
    let eligible: Vec<&FileEntry> =
        entries.iter().filter(|entry| MediaKind::of(entry).is_some()).collect();

    let mut loaded = Vec::new();
    let mut failed = Vec::new();
    for entry in &eligible {
        match thumbnails.get(&entry.name) {
            Some(thumbnail) => loaded.push(LoadedOutput {
                name: entry.name.clone(),
                mime_type: thumbnail.mime_type.clone(),
                bytes: thumbnail.decoded_len(),
            }),
            None => failed.push(entry.name.clone()),
        }
    }

    ThumbsOutput {
        directory: dir.display().to_string(),
        eligible: eligible.len(),
        loaded,
        failed,
        stats: loader.stats().into(),
        cache_entries: loader.global_cache_size(),
    }
}

fn run_settings(action: SettingsAction) -> Result<()> {
    let storage = storage()?;
    log::debug!("settings stored under {}", storage.root().display());
    let mut settings = storage.load_settings().context("failed to load settings")?;

    if let SettingsAction::Set { max_concurrent, size } = action {
        if let Some(max_concurrent) = max_concurrent {
            settings.file_max_concurrent_thumbnails = max_concurrent;
        }
        if let Some(size) = size {
            settings.file_thumbnail_size = size;
        }
        ensure_valid_settings(&settings)?;

        storage.save_settings(&settings).with_context(|| {
            format!("failed to save settings to {}", storage.settings_path().display())
        })?;
    }

    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn ensure_valid_settings(settings: &FileSettings) -> Result<()> {
    if settings.file_max_concurrent_thumbnails == 0 {
        anyhow::bail!("--max-concurrent must be >= 1");
    }

    if settings.file_thumbnail_size == 0 {
        anyhow::bail!("--size must be >= 1");
    }

    Ok(())
}

fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("directory does not exist: {}", path.display());
    }

    if !path.is_dir() {
        anyhow::bail!("path is not a directory: {}", path.display());
    }

    Ok(())
}
