//! Outbound collaborators: prompt assistant, image generator, upscaler,
//! object storage, image CDN, plain downloads and the wallpaper catalog.
//!
//! Each collaborator is a trait so the pipeline can be driven by in-memory
//! fakes in tests; the production implementations live in the submodules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::cli::ProviderOptions;
use crate::constants::HTTP_TIMEOUT;
use crate::db::entities::wallpapers;
use crate::error::WallpaperError;

pub mod cdn;
pub mod fetch;
pub mod openai;
pub mod replicate;
pub mod storage;

/// Identifies an assistant run started by [`PromptProvider::run`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunHandle {
    /// thread holding the conversation
    pub thread_id: String,
    /// the run executing on that thread
    pub run_id: String,
}

/// State of an assistant run as reported by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// waiting for capacity
    Queued,
    /// still working
    InProgress,
    /// finished, messages can be read
    Completed,
    /// the run failed, with the provider's reason
    Failed(String),
    /// the run was cancelled
    Cancelled,
    /// the run expired before finishing
    Expired,
    /// the run wants tool output we never provide
    RequiresAction,
    /// the run stopped early, eg on a token limit
    Incomplete,
    /// a status this crate does not know about
    Other(String),
}

impl RunStatus {
    /// Maps the provider's status string.
    pub fn from_api(status: &str, last_error: Option<String>) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" | "cancelling" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed(last_error.unwrap_or_else(|| "unknown error".to_string())),
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            "requires_action" => Self::RequiresAction,
            "incomplete" => Self::Incomplete,
            other => Self::Other(other.to_string()),
        }
    }

    /// A terminal status will never turn into [`RunStatus::Completed`].
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed(_)
                | Self::Cancelled
                | Self::Expired
                | Self::RequiresAction
                | Self::Incomplete
        )
    }
}

/// Writes creative briefs asynchronously: start a run, poll it, read the answer.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    /// Starts a run on a fresh thread with a single user message.
    async fn run(&self, instruction: &str) -> Result<RunHandle, WallpaperError>;
    /// Reads the current status of a run.
    async fn poll(&self, handle: &RunHandle) -> Result<RunStatus, WallpaperError>;
    /// Text of the newest assistant message on the thread.
    async fn latest_message(&self, thread_id: &str) -> Result<String, WallpaperError>;
}

/// Parameters for a single image generation call
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRequest {
    /// image model
    pub model: String,
    /// text prompt
    pub prompt: String,
    /// number of images
    pub n: u8,
    /// `WIDTHxHEIGHT`
    pub size: String,
    /// quality level
    pub quality: String,
    /// `url` or `b64_json`
    pub response_format: String,
}

/// One generated image
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedImage {
    /// where the image can be downloaded, for `url` responses
    pub url: Option<String>,
    /// the generator's rewrite of the prompt
    pub revised_prompt: Option<String>,
}

/// Turns a text prompt into images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generates images, returning whatever the provider produced (possibly nothing).
    async fn generate(&self, request: &ImageRequest)
    -> Result<Vec<GeneratedImage>, WallpaperError>;
}

/// Enlarges an image hosted at a URL.
#[async_trait]
pub trait Upscaler: Send + Sync {
    /// Runs the upscaler model and returns its raw output, which is expected
    /// to be a JSON string holding the result URL.
    async fn upscale(
        &self,
        model: &str,
        image_url: &str,
        scale: u32,
        face_enhance: bool,
    ) -> Result<serde_json::Value, WallpaperError>;
}

/// Durable blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under a freshly generated key carrying `filename`'s extension.
    async fn put(&self, bytes: Vec<u8>, filename: &str) -> Result<String, WallpaperError>;
    /// Stores `bytes` at an existing key, replacing what was there.
    async fn put_at(&self, key: &str, bytes: Vec<u8>) -> Result<(), WallpaperError>;
    /// Temporary GET URL for `key`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError>;
    /// Temporary PUT URL a client can upload `key` to directly.
    async fn signed_put_url(&self, key: &str, ttl: Duration) -> Result<String, WallpaperError>;
}

/// Public image delivery network.
#[async_trait]
pub trait ImageCdn: Send + Sync {
    /// Ingests the image at `url`, returning its permanent id.
    async fn ingest(
        &self,
        url: &str,
        metadata: serde_json::Value,
        id: Option<&str>,
    ) -> Result<String, WallpaperError>;
    /// Public URL for an id, optionally for a named variant.
    fn public_url(&self, id: &str, variant: Option<&str>) -> String;
}

/// Binary HTTP downloads.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Downloads the body at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, WallpaperError>;
}

/// Append-only store of generated wallpapers.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Inserts one record; the catalog sets timestamps.
    async fn insert(
        &self,
        wallpaper: wallpapers::NewWallpaper,
    ) -> Result<wallpapers::Model, WallpaperError>;
}

/// 5xx and 429 answers are worth asking again.
pub(crate) fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// The production collaborators, shared between the pipeline and activation.
#[derive(Clone)]
pub struct Collaborators {
    /// prompt assistant
    pub prompts: Arc<dyn PromptProvider>,
    /// image generator
    pub images: Arc<dyn ImageGenerator>,
    /// upscaler
    pub upscaler: Arc<dyn Upscaler>,
    /// object storage
    pub store: Arc<dyn ObjectStore>,
    /// image CDN
    pub cdn: Arc<dyn ImageCdn>,
    /// downloads
    pub fetcher: Arc<dyn Fetcher>,
}

impl Collaborators {
    /// Builds the real clients from CLI/env settings.
    pub fn from_options(options: &ProviderOptions) -> Result<Self, WallpaperError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| WallpaperError::Config(format!("failed to build http client: {err}")))?;

        let openai = Arc::new(openai::OpenAiClient::new(
            http.clone(),
            &options.openai_api_token,
            &options.assistant_id,
        ));

        Ok(Self {
            prompts: openai.clone(),
            images: openai,
            upscaler: Arc::new(replicate::ReplicateClient::new(
                http.clone(),
                &options.replicate_api_token,
            )),
            store: Arc::new(storage::R2Storage::new(
                &options.r2_endpoint,
                &options.r2_bucket,
                &options.r2_access_key_id,
                &options.r2_secret_access_key,
            )?),
            cdn: Arc::new(cdn::CloudflareImages::new(
                http.clone(),
                &options.images_account_id,
                &options.images_account_hash,
                &options.images_api_token,
            )),
            fetcher: Arc::new(fetch::HttpFetcher::new(http)),
        })
    }
}
