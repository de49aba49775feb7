//! Wallpaper generation pipeline
//!
//! One run goes prompt → image → upscale → object storage → CDN + catalog,
//! strictly in that order. The first failing stage is logged with its payload
//! and returned; later stages never run and nothing is rolled back, so a run
//! that fails after storing the blob leaves that blob orphaned.
//!
//! Nothing here stops two runs overlapping if the scheduler fires while a
//! previous run is still going.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, error, info};

use crate::clients::{
    Catalog, Collaborators, Fetcher, ImageCdn, ImageGenerator, ImageRequest, ObjectStore,
    PromptProvider, RunStatus, Upscaler,
};
use crate::config::PipelineConfig;
use crate::db::entities::wallpapers::{self, NewWallpaper, WallpaperInput};
use crate::error::WallpaperError;
use crate::retry::{Poll, poll_bounded};

pub mod prompt;

pub use prompt::{PromptDetails, parse_prompt_content};

/// Filename handed to the object store; only its extension survives.
const STORED_FILENAME: &str = "wallpaper.png";

/// The image picked from the generator's answer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedWallpaper {
    /// where to download the generated image
    pub url: String,
    /// the generator's rewrite of the prompt, stored as provenance
    pub revised_prompt: String,
}

/// Orchestrates one wallpaper generation run
#[derive(Clone)]
pub struct WallpaperGenerationPipeline {
    config: PipelineConfig,
    prompts: Arc<dyn PromptProvider>,
    images: Arc<dyn ImageGenerator>,
    upscaler: Arc<dyn Upscaler>,
    store: Arc<dyn ObjectStore>,
    cdn: Arc<dyn ImageCdn>,
    fetcher: Arc<dyn Fetcher>,
    catalog: Arc<dyn Catalog>,
}

impl WallpaperGenerationPipeline {
    /// Wires the pipeline to its collaborators
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        Self {
            config,
            prompts: collaborators.prompts,
            images: collaborators.images,
            upscaler: collaborators.upscaler,
            store: collaborators.store,
            cdn: collaborators.cdn,
            fetcher: collaborators.fetcher,
            catalog,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Timer entry point: runs only when both feature flags are on.
    ///
    /// Returns `Ok(None)` without touching any collaborator when skipped.
    pub async fn run_scheduled(&self) -> Result<Option<wallpapers::Model>, WallpaperError> {
        if !self.config.scheduled_generation_enabled() {
            info!("wallpaper generation skipped due to feature flag");
            return Ok(None);
        }
        self.run().await.map(Some)
    }

    /// Runs every stage once, ignoring the feature flags.
    pub async fn run(&self) -> Result<wallpapers::Model, WallpaperError> {
        let details = self.generate_prompt().await?;
        let image = self.generate_image(&details.prompt).await?;
        let upscaled_url = self.upscale_image(&image.url).await?;
        let object_key = self.store_image(&upscaled_url).await?;
        let image_key = self.sync_image(&object_key).await?;

        let wallpaper = self
            .insert_wallpaper(NewWallpaper {
                object_key,
                image_key,
                input: WallpaperInput {
                    engine: self.config.engine.clone(),
                    prompt: image.revised_prompt,
                    styles: details.styles,
                    tags: details.tags,
                    colors: details.colors,
                },
            })
            .await?;

        info!(
            id = wallpaper.id,
            object_key = %wallpaper.object_key,
            image_key = %wallpaper.image_key,
            "generate wallpaper completed"
        );
        Ok(wallpaper)
    }

    /// Stage 1: ask the assistant for a brief, wait for it, parse it.
    pub async fn generate_prompt(&self) -> Result<PromptDetails, WallpaperError> {
        debug!("generate_prompt starting");

        let handle = self
            .prompts
            .run(&self.config.prompt_instruction)
            .await
            .inspect_err(|err| {
                error!(
                    error = %err,
                    instruction = %self.config.prompt_instruction,
                    "PromptProvider.run returned error"
                );
            })?;
        debug!(thread_id = %handle.thread_id, run_id = %handle.run_id, "prompt run started");

        poll_bounded(
            self.config.poll_attempts,
            self.config.poll_interval,
            |attempt| {
                let handle = &handle;
                async move {
                    let status = self.prompts.poll(handle).await?;
                    debug!(attempt, ?status, "prompt run status");
                    match status {
                        RunStatus::Completed => Ok(Poll::Ready(())),
                        status if status.is_terminal_failure() => Err(WallpaperError::Provider(
                            format!("prompt run ended without completing: {status:?}"),
                        )),
                        _ => Ok(Poll::Pending),
                    }
                }
            },
        )
        .await
        .inspect_err(|err| {
            error!(
                error = %err,
                thread_id = %handle.thread_id,
                run_id = %handle.run_id,
                "PromptProvider.poll returned error"
            );
        })?;

        let content = self
            .prompts
            .latest_message(&handle.thread_id)
            .await
            .inspect_err(|err| {
                error!(
                    error = %err,
                    thread_id = %handle.thread_id,
                    run_id = %handle.run_id,
                    "PromptProvider.latest_message returned error"
                );
            })?;
        debug!(%content, "prompt content received");

        let details = parse_prompt_content(&content).inspect_err(|err| {
            error!(error = %err, %content, "prompt content rejected");
        })?;

        debug!(?details, "generate_prompt completed");
        Ok(details)
    }

    /// Stage 2: render exactly one image for `prompt`.
    pub async fn generate_image(
        &self,
        prompt: &str,
    ) -> Result<GeneratedWallpaper, WallpaperError> {
        debug!("generate_image starting");

        let request = ImageRequest {
            model: self.config.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: self.config.image_size.clone(),
            quality: self.config.image_quality.clone(),
            response_format: "url".to_string(),
        };
        let images = self.images.generate(&request).await.inspect_err(|err| {
            error!(error = %err, payload = ?request, "ImageGenerator.generate returned error");
        })?;

        let Some(first) = images.into_iter().next() else {
            let err = WallpaperError::EmptyResult("ImageGenerator.generate".to_string());
            error!(error = %err, payload = ?request, "no images generated");
            return Err(err);
        };
        let Some(url) = first.url else {
            let err = WallpaperError::UnexpectedShape("generated image has no url".to_string());
            error!(error = %err, payload = ?request, "generated image unusable");
            return Err(err);
        };
        let revised_prompt = first.revised_prompt.unwrap_or_else(|| prompt.to_string());

        debug!(%url, %revised_prompt, "generate_image completed");
        Ok(GeneratedWallpaper {
            url,
            revised_prompt,
        })
    }

    /// Stage 3: upscale with the pinned model and fixed factor.
    pub async fn upscale_image(&self, url: &str) -> Result<String, WallpaperError> {
        debug!("upscale_image starting");

        let payload = json!({
            "model": self.config.upscaler_model,
            "url": url,
            "scale": self.config.scale_factor,
            "face_enhance": self.config.face_enhance,
        });
        let output = self
            .upscaler
            .upscale(
                &self.config.upscaler_model,
                url,
                self.config.scale_factor,
                self.config.face_enhance,
            )
            .await
            .inspect_err(|err| {
                error!(error = %err, %payload, "Upscaler.upscale returned error");
            })?;
        let upscaled = upscaled_url(output).inspect_err(|err| {
            error!(error = %err, %payload, "Upscaler.upscale returned unsupported reply");
        })?;

        debug!(%upscaled, "upscale_image completed");
        Ok(upscaled)
    }

    /// Stage 4: download the upscaled image and store it under a new key.
    pub async fn store_image(&self, url: &str) -> Result<String, WallpaperError> {
        debug!("store_image starting");

        let bytes = self.fetcher.fetch(url).await.inspect_err(|err| {
            error!(error = %err, %url, "Fetcher.fetch returned error");
        })?;
        debug!(size = bytes.len(), "upscaled image downloaded");

        let object_key = self.store.put(bytes, STORED_FILENAME).await.inspect_err(|err| {
            error!(error = %err, %url, "ObjectStore.put returned error");
        })?;

        debug!(%object_key, "store_image completed");
        Ok(object_key)
    }

    /// Stage 5a: hand a signed URL for the blob to the CDN.
    pub async fn sync_image(&self, object_key: &str) -> Result<String, WallpaperError> {
        debug!("sync_image starting");

        let signed_url = self
            .store
            .signed_url(object_key, self.config.signed_url_ttl)
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, "ObjectStore.signed_url returned error");
            })?;

        let image_key = self
            .cdn
            .ingest(&signed_url, json!({}), None)
            .await
            .inspect_err(|err| {
                error!(error = %err, %object_key, %signed_url, "ImageCdn.ingest returned error");
            })?;

        debug!(%image_key, "sync_image completed");
        Ok(image_key)
    }

    /// Stage 5b: record the wallpaper.
    pub async fn insert_wallpaper(
        &self,
        wallpaper: NewWallpaper,
    ) -> Result<wallpapers::Model, WallpaperError> {
        debug!("insert_wallpaper starting");
        let payload = format!("{wallpaper:?}");
        let model = self.catalog.insert(wallpaper).await.inspect_err(|err| {
            error!(error = %err, %payload, "Catalog.insert returned error");
        })?;
        debug!(id = model.id, "insert_wallpaper completed");
        Ok(model)
    }
}

/// The upscaler must answer with a single URL string.
pub fn upscaled_url(output: Value) -> Result<String, WallpaperError> {
    match output {
        Value::String(url) => Ok(url),
        other => Err(WallpaperError::UnexpectedShape(format!(
            "upscaler returned {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
