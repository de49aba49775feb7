//! OpenAI assistants (prompt writing) and images (generation) client.
//!
//! Assistants API: https://platform.openai.com/docs/api-reference/runs
//! Images API: https://platform.openai.com/docs/api-reference/images

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    GeneratedImage, ImageGenerator, ImageRequest, PromptProvider, RunHandle, RunStatus,
    is_transient_status,
};
use crate::constants::OPENAI_API_BASE;
use crate::error::WallpaperError;

const ASSISTANTS_BETA: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Client for the OpenAI endpoints the pipeline uses
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    assistant_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    id: String,
    thread_id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    created_at: i64,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum MessageContent {
    #[serde(rename = "text")]
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

/// Request body for POST /v1/images/generations
#[derive(Serialize, Debug)]
struct ImagesGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Deserialize, Debug)]
struct ImagesGenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
struct ImageData {
    url: Option<String>,
    revised_prompt: Option<String>,
}

impl OpenAiClient {
    /// New client using `assistant_id` for prompt runs
    pub fn new(client: reqwest::Client, api_key: &str, assistant_id: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            assistant_id: assistant_id.to_string(),
        }
    }

    async fn read_json<T: DeserializeOwned>(
        what: &str,
        resp: reqwest::Response,
    ) -> Result<T, WallpaperError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = format!(
                "OpenAI {what} error {status}: {}",
                String::from_utf8_lossy(&bytes)
            );
            return Err(if is_transient_status(status) {
                WallpaperError::Transient(message)
            } else {
                WallpaperError::Provider(message)
            });
        }
        serde_json::from_slice(&bytes).map_err(|err| {
            WallpaperError::Provider(format!("Failed to parse OpenAI {what} JSON: {err}"))
        })
    }
}

fn newest_assistant_text(messages: MessageList) -> Result<String, WallpaperError> {
    let latest = messages
        .data
        .into_iter()
        .filter(|message| message.role == "assistant")
        .max_by_key(|message| message.created_at)
        .ok_or_else(|| WallpaperError::EmptyResult("assistant messages".to_string()))?;

    match latest.content.into_iter().next() {
        Some(MessageContent::Text { text }) => Ok(text.value),
        Some(MessageContent::Other) => Err(WallpaperError::UnexpectedShape(
            "assistant message content is not text".to_string(),
        )),
        None => Err(WallpaperError::EmptyResult(
            "assistant message content".to_string(),
        )),
    }
}

#[async_trait]
impl PromptProvider for OpenAiClient {
    async fn run(&self, instruction: &str) -> Result<RunHandle, WallpaperError> {
        let body = json!({
            "assistant_id": self.assistant_id,
            "thread": {
                "messages": [
                    {"role": "user", "content": instruction}
                ]
            }
        });
        let resp = self
            .client
            .post(format!("{OPENAI_API_BASE}/threads/runs"))
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .json(&body)
            .send()
            .await?;
        let run: RunResponse = Self::read_json("threads/runs", resp).await?;
        debug!(
            thread_id = %run.thread_id,
            run_id = %run.id,
            status = %run.status,
            "assistant run created"
        );
        Ok(RunHandle {
            thread_id: run.thread_id,
            run_id: run.id,
        })
    }

    async fn poll(&self, handle: &RunHandle) -> Result<RunStatus, WallpaperError> {
        let resp = self
            .client
            .get(format!(
                "{OPENAI_API_BASE}/threads/{}/runs/{}",
                handle.thread_id, handle.run_id
            ))
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .send()
            .await?;
        let run: RunResponse = Self::read_json("runs", resp).await?;
        let last_error = run.last_error.map(|err| {
            format!(
                "{}: {}",
                err.code.unwrap_or_default(),
                err.message.unwrap_or_default()
            )
        });
        Ok(RunStatus::from_api(&run.status, last_error))
    }

    async fn latest_message(&self, thread_id: &str) -> Result<String, WallpaperError> {
        let resp = self
            .client
            .get(format!(
                "{OPENAI_API_BASE}/threads/{thread_id}/messages?order=desc"
            ))
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
            .send()
            .await?;
        let messages: MessageList = Self::read_json("messages", resp).await?;
        newest_assistant_text(messages)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(
        &self,
        request: &ImageRequest,
    ) -> Result<Vec<GeneratedImage>, WallpaperError> {
        let body = ImagesGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            n: request.n,
            size: &request.size,
            quality: &request.quality,
            response_format: &request.response_format,
        };
        let resp = self
            .client
            .post(format!("{OPENAI_API_BASE}/images/generations"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: ImagesGenerateResponse = Self::read_json("images/generations", resp).await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|image| GeneratedImage {
                url: image.url,
                revised_prompt: image.revised_prompt,
            })
            .collect())
    }
}
