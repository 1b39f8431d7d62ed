use std::time::Duration;

use crate::error::{Error, Result};
use crate::FetchedImage;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    /// Bound for the availability check done while selecting a candidate.
    pub probe_timeout_ms: u64,
    /// Bound for downloading the full image body.
    pub download_timeout_ms: u64,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            download_timeout_ms: DEFAULT_DOWNLOAD_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageDownloader {
    options: DownloaderOptions,
    client: reqwest::Client,
}

impl ImageDownloader {
    pub fn new(options: DownloaderOptions) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { options, client })
    }

    /// Check that the image is reachable: request it and look at the status only.
    /// The body is dropped without being read.
    pub async fn probe(&self, url: &str) -> Result<()> {
        let timeout = self.options.probe_timeout_ms;
        let response = with_timeout(timeout, self.client.get(parse_url(url)?).send()).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Download the whole image into memory.
    pub async fn download(&self, url: &str) -> Result<FetchedImage> {
        let timeout = self.options.download_timeout_ms;
        with_timeout(timeout, self.download_inner(url)).await?
    }

    async fn download_inner(&self, url: &str) -> Result<FetchedImage> {
        // 1. Send request to the URL
        let mut response = self.client.get(parse_url(url)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        let content_length = response.content_length();
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string());

        // 2. Download the image, write to a buffer
        let mut buffer = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }

        // 3. Check if the file is complete
        check_complete(url, buffer.len() as u64, content_length)?;
        tracing::debug!("Downloaded {} bytes from {}", buffer.len(), url);

        Ok(FetchedImage {
            url: url.to_string(),
            bytes: buffer,
            mime_type,
        })
    }
}

fn parse_url(url: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_string()))
}

async fn with_timeout<T>(timeout_ms: u64, f: impl std::future::Future<Output = T>) -> Result<T> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), f)
        .await
        .map_err(|_| Error::Timeout(timeout_ms))
}

fn check_complete(url: &str, size: u64, content_length: Option<u64>) -> Result<()> {
    if let Some(content_length) = content_length {
        if size != content_length {
            return Err(Error::IncompleteDownload(url.to_string()));
        }
    }
    if size == 0 {
        return Err(Error::IncompleteDownload(url.to_string()));
    }
    Ok(())
}
