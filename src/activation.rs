//! Image upload and activation
//!
//! A client first asks for an upload target: a fresh object key plus a
//! presigned PUT URL it uploads the blob to directly. Activating that key then
//! upscales the blob in place if it is small, syncs it to the CDN and records
//! it in the images table. No row is written unless every step succeeds.
//!
//! Unlike the generation pipeline, which always upscales by a fixed factor,
//! activation measures the stored image first and picks the factor from its
//! longest side. A factor of 1 leaves the blob untouched.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageReader;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::clients::{Collaborators, Fetcher, ImageCdn, ObjectStore, Upscaler, storage};
use crate::config::PipelineConfig;
use crate::constants::{UPSCALE_X2_BELOW, UPSCALE_X3_BELOW};
use crate::db::entities::images;
use crate::error::WallpaperError;
use crate::pipeline::upscaled_url;

/// Pixel size of an image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    /// width in pixels
    pub width: u32,
    /// height in pixels
    pub height: u32,
}

/// Upscale factor for an image of the given size: 3 below 1920px on the
/// longest side, 2 below 3840px, otherwise 1 (no upscale).
pub fn scale_factor_for(width: u32, height: u32) -> u32 {
    let longest = width.max(height);
    if longest < UPSCALE_X3_BELOW {
        3
    } else if longest < UPSCALE_X2_BELOW {
        2
    } else {
        1
    }
}

/// Reads the pixel size from encoded image bytes without decoding pixels.
pub fn image_dimensions(bytes: &[u8]) -> Result<Dimensions, WallpaperError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| WallpaperError::ImageDecode(err.to_string()))?
        .into_dimensions()?;
    Ok(Dimensions { width, height })
}

/// Where a client should upload a new image
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    /// object key to pass to activation once the upload is done
    pub key: String,
    /// presigned PUT URL for that key
    pub put_signed_url: String,
}

/// Result of activating an uploaded image
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivatedImage {
    /// row id in the images table
    pub id: i32,
    /// CDN id
    pub image_key: String,
    /// public CDN URL
    pub image_url: String,
    /// key of the blob in object storage
    pub object_key: String,
    /// temporary GET URL for the blob
    pub object_signed_url: String,
    /// final pixel width
    pub width: i32,
    /// final pixel height
    pub height: i32,
}

/// CDN id for an object key: the last path segment up to its first `.`.
///
/// Falls back to a random key when that leaves nothing.
pub fn id_from_object_key(object_key: &str) -> String {
    let name = object_key.rsplit('/').next().unwrap_or(object_key);
    let stem = name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        storage::random_key()
    } else {
        stem.to_string()
    }
}

/// Measures, optionally upscales and syncs stored images
#[derive(Clone)]
pub struct ImageActivation {
    config: PipelineConfig,
    upscaler: Arc<dyn Upscaler>,
    store: Arc<dyn ObjectStore>,
    cdn: Arc<dyn ImageCdn>,
    fetcher: Arc<dyn Fetcher>,
    db: DatabaseConnection,
}

impl ImageActivation {
    /// Builds the activation flow over the shared collaborators
    pub fn new(
        config: PipelineConfig,
        collaborators: &Collaborators,
        db: DatabaseConnection,
    ) -> Self {
        Self {
            config,
            upscaler: collaborators.upscaler.clone(),
            store: collaborators.store.clone(),
            cdn: collaborators.cdn.clone(),
            fetcher: collaborators.fetcher.clone(),
            db,
        }
    }

    /// Upscales the blob at `object_key` if it is small, writing the result
    /// back to the same key. Returns the dimensions of whatever is stored
    /// afterwards.
    pub async fn upscale_then_overwrite(
        &self,
        object_key: &str,
    ) -> Result<Dimensions, WallpaperError> {
        let signed_url = self
            .store
            .signed_url(object_key, self.config.signed_url_ttl)
            .await?;
        let original = self.fetcher.fetch(&signed_url).await?;
        let dimensions = image_dimensions(&original).inspect_err(|err| {
            error!(error = %err, %object_key, "stored image could not be measured");
        })?;

        let scale = scale_factor_for(dimensions.width, dimensions.height);
        debug!(%object_key, ?dimensions, scale, "upscale decision");
        if scale == 1 {
            return Ok(dimensions);
        }

        let output = self
            .upscaler
            .upscale(&self.config.upscaler_model, &signed_url, scale, false)
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, scale, "Upscaler.upscale returned error");
            })?;
        let upscaled = self.fetcher.fetch(&upscaled_url(output)?).await?;
        let upscaled_dimensions = image_dimensions(&upscaled)?;

        self.store
            .put_at(object_key, upscaled)
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, "ObjectStore.put_at returned error");
            })?;

        info!(
            %object_key,
            scale,
            width = upscaled_dimensions.width,
            height = upscaled_dimensions.height,
            "image upscaled in place"
        );
        Ok(upscaled_dimensions)
    }

    /// Ingests the blob into the CDN under an id derived from its key.
    pub async fn sync_image(&self, object_key: &str) -> Result<String, WallpaperError> {
        let signed_url = self
            .store
            .signed_url(object_key, self.config.signed_url_ttl)
            .await?;
        let id = id_from_object_key(object_key);
        self.cdn
            .ingest(&signed_url, json!({}), Some(&id))
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, %id, "ImageCdn.ingest returned error");
            })
    }

    /// Reserves a fresh key carrying `filename`'s extension and presigns an
    /// upload to it.
    pub async fn upload_target(&self, filename: &str) -> Result<UploadTarget, WallpaperError> {
        let key = storage::key_for_filename(filename);
        let put_signed_url = self
            .store
            .signed_put_url(&key, self.config.signed_url_ttl)
            .await
            .inspect_err(|err| {
                error!(error = %err, %key, "ObjectStore.signed_put_url returned error");
            })?;
        debug!(%key, %filename, "upload target issued");
        Ok(UploadTarget {
            key,
            put_signed_url,
        })
    }

    /// Activates the uploaded blob at `object_key`: upscale if needed, sync
    /// to the CDN, then record it with its final size and CDN id.
    pub async fn activate(&self, object_key: &str) -> Result<ActivatedImage, WallpaperError> {
        let dimensions = self.upscale_then_overwrite(object_key).await?;
        let image_key = self.sync_image(object_key).await?;

        let image = images::insert_activated(&self.db, object_key, image_key, dimensions)
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, "images insert returned error");
            })?;
        let image_url = self.cdn.public_url(&image.image_key, Some("public"));
        let object_signed_url = self
            .store
            .signed_url(object_key, self.config.signed_url_ttl)
            .await?;

        info!(id = image.id, %object_key, %image_url, "image activated");
        Ok(ActivatedImage {
            id: image.id,
            image_key: image.image_key,
            image_url,
            object_key: image.object_key,
            object_signed_url,
            width: image.width,
            height: image.height,
        })
    }
}
