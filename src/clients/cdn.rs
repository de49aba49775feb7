//! Cloudflare Images client
use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::{ImageCdn, is_transient_status};
use crate::constants::{CLOUDFLARE_API_BASE, IMAGE_DELIVERY_BASE};
use crate::error::WallpaperError;

/// Image CDN backed by Cloudflare Images
#[derive(Clone, Debug)]
pub struct CloudflareImages {
    client: reqwest::Client,
    account_id: String,
    account_hash: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<UploadResult>,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    id: String,
}

impl CloudflareImages {
    /// New client for `account_id`; `account_hash` builds delivery URLs
    pub fn new(
        client: reqwest::Client,
        account_id: &str,
        account_hash: &str,
        api_token: &str,
    ) -> Self {
        Self {
            client,
            account_id: account_id.to_string(),
            account_hash: account_hash.to_string(),
            api_token: api_token.to_string(),
        }
    }

    fn request_url(&self, path: &str) -> String {
        format!("{CLOUDFLARE_API_BASE}/accounts/{}{}", self.account_id, path)
    }
}

fn upload_id(response: UploadResponse) -> Result<String, WallpaperError> {
    match response.result {
        Some(result) if response.success => Ok(result.id),
        _ => Err(WallpaperError::Cdn(format!(
            "upload rejected: {}",
            serde_json::Value::Array(response.errors)
        ))),
    }
}

fn delivery_url(account_hash: &str, id: &str, variant: Option<&str>) -> String {
    match variant {
        Some(variant) => format!("{IMAGE_DELIVERY_BASE}/{account_hash}/{id}/{variant}"),
        None => format!("{IMAGE_DELIVERY_BASE}/{account_hash}/{id}"),
    }
}

#[async_trait]
impl ImageCdn for CloudflareImages {
    async fn ingest(
        &self,
        url: &str,
        metadata: serde_json::Value,
        id: Option<&str>,
    ) -> Result<String, WallpaperError> {
        let mut form = Form::new()
            .text("url", url.to_string())
            .text("metadata", metadata.to_string());
        if let Some(id) = id {
            form = form.text("id", id.to_string());
        }

        let resp = self
            .client
            .post(self.request_url("/images/v1"))
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = format!(
                "Cloudflare images upload error {status}: {}",
                String::from_utf8_lossy(&bytes)
            );
            return Err(if is_transient_status(status) {
                WallpaperError::Transient(message)
            } else {
                WallpaperError::Cdn(message)
            });
        }
        let parsed: UploadResponse = serde_json::from_slice(&bytes)
            .map_err(|err| WallpaperError::Cdn(format!("Failed to parse upload response: {err}")))?;
        upload_id(parsed)
    }

    fn public_url(&self, id: &str, variant: Option<&str>) -> String {
        delivery_url(&self.account_hash, id, variant)
    }
}
