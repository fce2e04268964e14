use crate::error::{FlowlineError, Result};
use async_trait::async_trait;
use std::path::Path;

/// Fetches installers and source archives
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub struct HttpDownloader {
    http_client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        log::info!("Downloading {} -> {}", url, dest.display());

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowlineError::Download(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(FlowlineError::Download(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FlowlineError::Download(format!("{}: {}", url, e)))?;

        tokio::fs::write(dest, &bytes).await?;
        log::info!("Downloaded {} bytes", bytes.len());

        Ok(bytes.len() as u64)
    }
}
