//! Config handling

use std::time::Duration;

use tracing::log::LevelFilter;

use crate::constants::*;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info)
            .with_module_level("sqlx", LevelFilter::Warn)
            .with_module_level("tokio_cron_scheduler", LevelFilter::Warn);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Runtime knobs for the wallpaper generation pipeline.
///
/// Everything that used to be a literal in the generation flow lives here so
/// tests can shorten delays or swap model ids.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Master switch for scheduled jobs, `SCHEDULER_ENABLED`
    pub scheduler_enabled: bool,
    /// Switch for the generation job, `SCHEDULER_GENERATE_WALLPAPER_ENABLED`
    pub generate_wallpaper_enabled: bool,
    /// Assistant that writes the creative brief
    pub assistant_id: String,
    /// Instruction sent to the assistant
    pub prompt_instruction: String,
    /// Prompt run poll budget
    pub poll_attempts: u32,
    /// Wait after each unfinished poll
    pub poll_interval: Duration,
    /// Image generation model
    pub image_model: String,
    /// Requested image size, `WIDTHxHEIGHT`
    pub image_size: String,
    /// Requested image quality
    pub image_quality: String,
    /// Engine label stored in the record provenance
    pub engine: String,
    /// Pinned upscaler model version
    pub upscaler_model: String,
    /// Scale factor used for generated images
    pub scale_factor: u32,
    /// Whether the upscaler should run face enhancement
    pub face_enhance: bool,
    /// Lifetime of signed URLs handed to the CDN
    pub signed_url_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheduler_enabled: false,
            generate_wallpaper_enabled: false,
            assistant_id: DEFAULT_ASSISTANT_ID.to_string(),
            prompt_instruction: DEFAULT_PROMPT_INSTRUCTION.to_string(),
            poll_attempts: PROMPT_POLL_ATTEMPTS,
            poll_interval: PROMPT_POLL_INTERVAL,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            image_quality: DEFAULT_IMAGE_QUALITY.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            upscaler_model: DEFAULT_UPSCALER_MODEL.to_string(),
            scale_factor: DEFAULT_SCALE_FACTOR,
            face_enhance: false,
            signed_url_ttl: SIGNED_URL_TTL,
        }
    }
}

impl PipelineConfig {
    /// Both feature flags must be on for the scheduled job to do anything.
    pub fn scheduled_generation_enabled(&self) -> bool {
        self.scheduler_enabled && self.generate_wallpaper_enabled
    }
}
