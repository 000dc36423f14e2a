use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::models::Event;
use crate::retry::RetryPolicy;

const KNOWN_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("http error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("non-success status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("not an image: {url} ({content_type})")]
    NotImage { url: String, content_type: String },
    #[error("image io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageStats {
    pub total_urls: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub image_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    local_path: PathBuf,
    event_title: String,
    event_date: NaiveDate,
    venue: String,
}

/// Mirrors event images to a local directory, a bounded number at a time.
pub struct ImageDownloader {
    client: Client,
    image_dir: PathBuf,
    limiter: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl ImageDownloader {
    pub fn new(config: &AppConfig) -> Result<Self, ImageError> {
        let image_dir = config.image_dir();
        fs::create_dir_all(&image_dir)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| ImageError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self {
            client,
            image_dir,
            limiter: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            retry: config.retry_policy(),
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Downloads every distinct image referenced by `events`. Individual
    /// failures are logged and counted, never raised.
    pub async fn download_all(&self, events: &[Event]) -> ImageStats {
        let urls = unique_image_urls(events);
        info!(count = urls.len(), "downloading event images");

        let mut tasks = JoinSet::new();
        for url in urls.iter().cloned() {
            let client = self.client.clone();
            let dir = self.image_dir.clone();
            let limiter = Arc::clone(&self.limiter);
            let retry = self.retry;
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.ok();
                let result = download_one(&client, &dir, &url, retry).await;
                (url, result)
            });
        }

        let mut downloaded = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(path))) => {
                    debug!(?path, "image stored");
                    downloaded += 1;
                }
                Ok((url, Err(err))) => {
                    warn!(%url, %err, "image download failed");
                    failed += 1;
                }
                Err(err) => {
                    warn!(%err, "image task aborted");
                    failed += 1;
                }
            }
        }

        ImageStats {
            total_urls: urls.len(),
            downloaded,
            failed,
            image_dir: self.image_dir.clone(),
        }
    }

    /// Where `url` was saved, if it has been downloaded.
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        existing_file(&self.image_dir, url)
    }

    /// Writes a JSON map from image URL to the local file and the event that
    /// referenced it. Returns the number of entries.
    pub fn write_manifest(&self, events: &[Event], path: &Path) -> Result<usize, ImageError> {
        let mut manifest = BTreeMap::new();
        for event in events {
            let Some(url) = event.image_url.as_deref() else {
                continue;
            };
            if let Some(local_path) = self.local_path(url) {
                manifest.insert(
                    url.to_string(),
                    ManifestEntry {
                        local_path,
                        event_title: event.title.clone(),
                        event_date: event.date,
                        venue: event.venue.clone(),
                    },
                );
            }
        }
        fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        info!(count = manifest.len(), ?path, "wrote image manifest");
        Ok(manifest.len())
    }
}

/// Distinct image URLs in first-seen order.
pub fn unique_image_urls(events: &[Event]) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter_map(|event| event.image_url.as_deref())
        .filter(|url| !url.trim().is_empty())
        .filter(|url| seen.insert(url.to_string()))
        .map(str::to_string)
        .collect()
}

/// `<first 12 hex chars of sha256(url)><ext>`, the extension taken from the
/// URL path, then the content type, then `.jpg`.
pub fn file_name(url: &str, content_type: Option<&str>) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    let stem = &digest[..12];

    let path = reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    if let Some(ext) = KNOWN_EXTENSIONS.iter().find(|ext| path.ends_with(*ext)) {
        return format!("{stem}{ext}");
    }

    let ext = content_type
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .and_then(extension_for_mime)
        .unwrap_or(".jpg");
    format!("{stem}{ext}")
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/jpg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/svg+xml" => Some(".svg"),
        "image/avif" => Some(".avif"),
        _ => None,
    }
}

fn existing_file(dir: &Path, url: &str) -> Option<PathBuf> {
    let by_url = dir.join(file_name(url, None));
    if by_url.exists() {
        return Some(by_url);
    }
    // Extension-less URLs are named after their content type.
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    let stem = &digest[..12];
    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s == stem)
        })
}

async fn download_one(
    client: &Client,
    dir: &Path,
    url: &str,
    retry: RetryPolicy,
) -> Result<PathBuf, ImageError> {
    if let Some(existing) = existing_file(dir, url) {
        debug!(%url, "image already on disk");
        return Ok(existing);
    }

    let response = retry
        .run_async(url, |_| async {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|source| ImageError::Http {
                    url: url.to_string(),
                    source,
                })?;
            let status = response.status();
            if status.is_success() {
                Ok(response)
            } else {
                Err(ImageError::Status {
                    url: url.to_string(),
                    status,
                })
            }
        })
        .await?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(ImageError::NotImage {
            url: url.to_string(),
            content_type,
        });
    }

    let path = dir.join(file_name(url, Some(&content_type)));
    let bytes = response.bytes().await.map_err(|source| ImageError::Http {
        url: url.to_string(),
        source,
    })?;
    tokio::task::spawn_blocking({
        let path = path.clone();
        move || fs::write(path, bytes)
    })
    .await
    .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))??;
    Ok(path)
}
