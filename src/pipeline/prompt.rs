//! Parsing of the assistant's wallpaper brief

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::WallpaperError;

#[allow(clippy::unwrap_used)]
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A(?:```json\n)?(.*?)(?:\n```)?\z").unwrap());

/// Creative brief returned by the prompt assistant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromptDetails {
    /// text prompt for the image model
    pub prompt: String,
    /// suggested art styles
    #[serde(default)]
    pub styles: Option<Vec<String>>,
    /// suggested tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// suggested colours
    #[serde(default)]
    pub colors: Option<Vec<String>>,
}

/// Trims surrounding whitespace, then removes one leading "```json\n" and one
/// trailing "\n```", if present.
pub fn strip_code_fence(content: &str) -> &str {
    let content = content.trim();
    CODE_FENCE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map_or(content, |m| m.as_str())
}

/// Parses and validates the assistant's reply.
///
/// Unparseable text is [`WallpaperError::MalformedContent`]; JSON that does not
/// match [`PromptDetails`] or has an empty prompt is
/// [`WallpaperError::SchemaViolation`].
pub fn parse_prompt_content(content: &str) -> Result<PromptDetails, WallpaperError> {
    let stripped = strip_code_fence(content);
    let value: serde_json::Value = serde_json::from_str(stripped)
        .map_err(|err| WallpaperError::MalformedContent(err.to_string()))?;
    let details: PromptDetails = serde_json::from_value(value)
        .map_err(|err| WallpaperError::SchemaViolation(err.to_string()))?;
    if details.prompt.trim().is_empty() {
        return Err(WallpaperError::SchemaViolation(
            "\"prompt\" is not allowed to be empty".to_string(),
        ));
    }
    Ok(details)
}
