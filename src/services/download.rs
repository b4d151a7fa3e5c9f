// src/services/download.rs

//! Streaming download of catalog entries.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CatalogEntry, CrawlerConfig};
use crate::utils::fs::ensure_dir;
use crate::utils::url::sanitize_file_name;

/// Progress of a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded: u64,
    /// From `Content-Length`, when the server sends one
    pub total: Option<u64>,
    pub elapsed: Duration,
}

impl DownloadProgress {
    /// Completed fraction in `0.0..=1.0`, if the total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total
            .filter(|total| *total > 0)
            .map(|total| (self.downloaded as f64 / total as f64).min(1.0))
    }

    /// Bytes per second.
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.downloaded as f64 / secs
        } else {
            0.0
        }
    }

    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.downloaded) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }
}

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSummary {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Downloads files over HTTP.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with the configured user agent. Only connecting is bounded by
    /// the timeout; the body may take as long as it needs.
    pub fn from_config(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::new(client))
    }

    /// Stream `url` into `dest`.
    ///
    /// Data goes to `<dest>.part` first and is renamed into place once
    /// complete, so `dest` never holds a partial file. `on_progress` is
    /// called after every received chunk.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: impl FnMut(&DownloadProgress),
    ) -> Result<DownloadSummary> {
        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }

        let started = Instant::now();
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::download(url, e))?;
        let total = response.content_length();
        log::info!("Downloading {} -> {}", url, dest.display());

        let part = part_path(dest);
        let mut file = File::create(&part).await?;
        let mut downloaded = 0u64;

        let streamed = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| AppError::download(url, e))?
            {
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
                on_progress(&DownloadProgress {
                    downloaded,
                    total,
                    elapsed: started.elapsed(),
                });
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<(), AppError>(())
        }
        .await;

        if let Err(error) = streamed {
            drop(file);
            let _ = tokio::fs::remove_file(&part).await;
            return Err(error);
        }
        drop(file);
        tokio::fs::rename(&part, dest).await?;

        Ok(DownloadSummary {
            path: dest.to_path_buf(),
            bytes: downloaded,
            elapsed: started.elapsed(),
        })
    }
}

/// Where `entry` lands inside `folder`.
pub fn destination(entry: &CatalogEntry, folder: &Path) -> PathBuf {
    folder.join(sanitize_file_name(&entry.url, Some(&entry.name)))
}

/// Temporary path used while a download is in flight.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
