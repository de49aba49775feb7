//! Plain binary downloads
use async_trait::async_trait;

use super::{Fetcher, is_transient_status};
use crate::error::WallpaperError;

/// [`Fetcher`] over a shared reqwest client
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Wraps an existing client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WallpaperError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = format!("Image download error {status}");
            return Err(if is_transient_status(status) {
                WallpaperError::Transient(message)
            } else {
                WallpaperError::Provider(message)
            });
        }
        let bytes = resp.bytes().await?;
        tracing::debug!(size = bytes.len(), "downloaded image bytes");
        Ok(bytes.to_vec())
    }
}
