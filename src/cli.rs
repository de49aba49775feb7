//! CLI parser
use clap::{Args, Parser};
use std::num::NonZeroU16;

use crate::config::PipelineConfig;
use crate::constants::{DEFAULT_ASSISTANT_ID, DEFAULT_IMAGE_MODEL, DEFAULT_UPSCALER_MODEL};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "WALLGEN_DEBUG")]
    /// Enable debug logging. Env: WALLGEN_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "9000", env = "WALLGEN_PORT")]
    /// http listener, defaults to `9000`.
    /// Env: WALLGEN_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "WALLGEN_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: WALLGEN_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "WALLGEN_ADMIN_TOKEN", hide_env_values = true)]
    /// Bearer token for the admin routes; admin routes are refused without it.
    /// Env: WALLGEN_ADMIN_TOKEN
    pub admin_token: Option<String>,

    #[clap(long, env = "SCHEDULER_ENABLED")]
    /// Master switch for scheduled jobs. Env: SCHEDULER_ENABLED
    pub scheduler_enabled: bool,

    #[clap(long, env = "SCHEDULER_GENERATE_WALLPAPER_ENABLED")]
    /// Enables the 30 minute wallpaper generation job.
    /// Env: SCHEDULER_GENERATE_WALLPAPER_ENABLED
    pub generate_wallpaper_enabled: bool,

    #[command(flatten)]
    /// Database and provider settings
    pub providers: ProviderOptions,
}

impl CliOptions {
    /// Builds the pipeline configuration, including the scheduler flags.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            scheduler_enabled: self.scheduler_enabled,
            generate_wallpaper_enabled: self.generate_wallpaper_enabled,
            ..self.providers.pipeline_config()
        }
    }
}

#[derive(Args, Debug, Clone)]
/// Settings shared by the server and the one-shot generator
pub struct ProviderOptions {
    #[clap(long, default_value = "wallgen.sqlite", env = "WALLGEN_DATABASE_PATH")]
    /// Path to the database file, eg `/data/wallgen.sqlite`.
    /// Env: WALLGEN_DATABASE_PATH
    pub database_path: String,

    #[arg(long, env = "OPENAI_API_TOKEN", hide_env_values = true)]
    /// OpenAI API key
    pub openai_api_token: String,

    #[arg(long, default_value = DEFAULT_ASSISTANT_ID, env = "OPENAI_ASSISTANT_ID")]
    /// Assistant that writes the wallpaper brief
    pub assistant_id: String,

    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    /// Image model
    pub image_model: String,

    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token
    pub replicate_api_token: String,

    #[arg(long, default_value = DEFAULT_UPSCALER_MODEL, env = "REPLICATE_UPSCALER_MODEL")]
    /// Pinned upscaler model, `owner/name:version`
    pub upscaler_model: String,

    #[arg(long, env = "R2_ACCESS_KEY_ID", hide_env_values = true)]
    /// Object storage access key
    pub r2_access_key_id: String,

    #[arg(long, env = "R2_SECRET_ACCESS_KEY", hide_env_values = true)]
    /// Object storage secret key
    pub r2_secret_access_key: String,

    #[arg(long, env = "R2_ENDPOINT")]
    /// S3 compatible endpoint, eg `https://<account>.r2.cloudflarestorage.com`
    pub r2_endpoint: String,

    #[arg(long, env = "R2_BUCKET")]
    /// Bucket holding full resolution images
    pub r2_bucket: String,

    #[arg(long, env = "IMAGES_ACCOUNT_ID")]
    /// Cloudflare account id for the images API
    pub images_account_id: String,

    #[arg(long, env = "IMAGES_ACCOUNT_HASH")]
    /// Account hash used in public delivery URLs
    pub images_account_hash: String,

    #[arg(long, env = "IMAGES_API_TOKEN", hide_env_values = true)]
    /// Cloudflare images API token
    pub images_api_token: String,
}

impl ProviderOptions {
    /// Pipeline configuration with both scheduler flags off.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            assistant_id: self.assistant_id.clone(),
            image_model: self.image_model.clone(),
            upscaler_model: self.upscaler_model.clone(),
            ..Default::default()
        }
    }
}
