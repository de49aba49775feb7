//! S3 compatible object storage (Cloudflare R2)
use std::path::Path as StdPath;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ObjectStoreExt, PutPayload};
use rand::RngExt;
use rand::distr::Alphanumeric;

use super::ObjectStore;
use crate::constants::RANDOM_KEY_LENGTH;
use crate::error::WallpaperError;

/// Random alphanumeric id used for object keys and CDN ids
pub fn random_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// A fresh key carrying the extension of `filename`, eg `Xy3...9.png`
pub fn key_for_filename(filename: &str) -> String {
    match StdPath::new(filename).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!("{}.{}", random_key(), ext),
        None => random_key(),
    }
}

/// Bucket-backed [`ObjectStore`]
#[derive(Clone, Debug)]
pub struct R2Storage {
    store: AmazonS3,
    bucket: String,
}

impl R2Storage {
    /// Connects to `bucket` on an S3 compatible `endpoint`
    pub fn new(
        endpoint: &str,
        bucket: &str,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<Self, WallpaperError> {
        let parsed = url::Url::parse(endpoint)?;
        let store = AmazonS3Builder::new()
            .with_region("auto")
            .with_endpoint(endpoint)
            .with_allow_http(parsed.scheme() == "http")
            .with_bucket_name(bucket)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .build()
            .map_err(|err| WallpaperError::Config(err.to_string()))?;
        Ok(Self {
            store,
            bucket: bucket.to_string(),
        })
    }

    async fn sign(
        &self,
        method: Method,
        key: &str,
        ttl: Duration,
    ) -> Result<String, WallpaperError> {
        let url = self
            .store
            .signed_url(method.clone(), &Path::from(key), ttl)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key,
                    %method,
                    "signing url failed"
                );
            })?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl ObjectStore for R2Storage {
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, WallpaperError> {
        let key = key_for_filename(filename);
        self.put_at(&key, bytes).await?;
        Ok(key)
    }

    async fn put_at(&self, key: &str, bytes: Vec<u8>) -> Result<(), WallpaperError> {
        let size = bytes.len();
        self.store
            .put(&Path::from(key), PutPayload::from(bytes))
            .await
            .inspect_err(|err| {
                tracing::error!(error = %err, bucket = %self.bucket, key, "object put failed");
            })?;
        tracing::debug!(bucket = %self.bucket, key, size, "object stored");
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError> {
        self.sign(Method::GET, key, ttl).await
    }

    async fn signed_put_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError> {
        self.sign(Method::PUT, key, ttl).await
    }
}
