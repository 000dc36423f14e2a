pub mod config;
pub mod db;
pub mod dedup;
pub mod export;
pub mod images;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod scraping;
pub mod utils;

use std::path::Path;

use anyhow::Context;
use chrono::Utc;

use config::AppConfig;
use db::Store;
use images::{ImageDownloader, ImageStats};
use scraping::{Fetcher, VenueReport};

pub fn open_store(config: &AppConfig) -> anyhow::Result<Store> {
    let path = config.database_path();
    Store::open(&path).with_context(|| format!("opening event store at {}", path.display()))
}

/// Scrapes `ids`, or the configured venue list when `ids` is empty (which in
/// turn falls back to every registered venue).
pub fn scrape_venues(config: &AppConfig, ids: &[String]) -> anyhow::Result<Vec<VenueReport>> {
    let ids = if ids.is_empty() { &config.venues[..] } else { ids };
    let store = open_store(config)?;
    let fetcher = Fetcher::new(config).context("building http client")?;
    scraping::run_venues(ids, &fetcher, &store, Utc::now())
}

/// Writes every stored event to `path` as a JSON array.
pub fn export_store(config: &AppConfig, path: &Path) -> anyhow::Result<usize> {
    let store = open_store(config)?;
    let events = store.all_events()?;
    let count = export::write_events(path, &events)
        .with_context(|| format!("exporting events to {}", path.display()))?;
    Ok(count)
}

/// Downloads images for every stored event on a private runtime, optionally
/// writing the url-to-file manifest afterwards.
pub fn download_images(config: &AppConfig, manifest: Option<&Path>) -> anyhow::Result<ImageStats> {
    let store = open_store(config)?;
    let events = store.all_events()?;
    let downloader = ImageDownloader::new(config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting image runtime")?;
    let stats = runtime.block_on(downloader.download_all(&events));

    if let Some(path) = manifest {
        downloader
            .write_manifest(&events, path)
            .with_context(|| format!("writing image manifest to {}", path.display()))?;
    }
    Ok(stats)
}
