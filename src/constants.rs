//! Shared constants/defaults for the pipeline and its collaborators
//!

use std::time::Duration;

/// Instruction sent to the prompt assistant on every run.
pub const DEFAULT_PROMPT_INSTRUCTION: &str = "Suggest a prompt for a 9:16 wallpaper.";

/// Assistant that writes wallpaper briefs.
pub const DEFAULT_ASSISTANT_ID: &str = "asst_yNCS9n0KClW3uNhxNvYUuD14";

/// How many times the prompt run is polled before timing out.
pub const PROMPT_POLL_ATTEMPTS: u32 = 3;

/// Wait after each poll that did not see a completed run.
pub const PROMPT_POLL_INTERVAL: Duration = Duration::from_secs(8);

/// Image model used for generation.
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Portrait 9:16-ish size accepted by the image model.
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1792";

/// Quality requested from the image model.
pub const DEFAULT_IMAGE_QUALITY: &str = "hd";

/// Engine name recorded in the wallpaper provenance.
pub const DEFAULT_ENGINE: &str = "dall-e";

/// Pinned Real-ESRGAN model version on Replicate.
pub const DEFAULT_UPSCALER_MODEL: &str = "daanelson/real-esrgan-a100:499940604f95b416c3939423df5c64a5c95cfd32b464d755dacfe2192a2de7ef";

/// Scale factor used by the generation pipeline.
pub const DEFAULT_SCALE_FACTOR: u32 = 2;

/// Lifetime of signed object URLs handed to other services.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(300);

/// Images whose longest side is below this are upscaled 3x on activation.
pub const UPSCALE_X3_BELOW: u32 = 1920;

/// Images whose longest side is below this are upscaled 2x on activation.
pub const UPSCALE_X2_BELOW: u32 = 3840;

/// Length of generated object keys and CDN ids, without extension.
pub const RANDOM_KEY_LENGTH: usize = 36;

/// Cron expression for the generation job, every 30 minutes.
pub const GENERATE_WALLPAPER_CRON: &str = "0 */30 * * * *";

/// Default timeout for outbound HTTP calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Base URL of the OpenAI API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Base URL of the Replicate API.
pub const REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";

/// Base URL of the Cloudflare API.
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Public delivery host for Cloudflare Images.
pub const IMAGE_DELIVERY_BASE: &str = "https://imagedelivery.net";

/// How often a Replicate prediction is polled.
pub const PREDICTION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Replicate predictions not finished after this many polls are abandoned.
pub const PREDICTION_MAX_POLLS: u32 = 150;
