//! Replicate predictions client, used for Real-ESRGAN upscaling.
//!
//! Model: https://replicate.com/daanelson/real-esrgan-a100

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;

use super::{Upscaler, is_transient_status};
use crate::constants::{PREDICTION_MAX_POLLS, PREDICTION_POLL_INTERVAL, REPLICATE_API_BASE};
use crate::error::WallpaperError;
use crate::retry::Poll;

/// Client for creating and waiting on Replicate predictions
#[derive(Clone, Debug)]
pub struct ReplicateClient {
    client: reqwest::Client,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Splits `owner/name:version` into the version hash Replicate expects.
fn model_version(model: &str) -> Result<&str, WallpaperError> {
    match model.rsplit_once(':') {
        Some((_, version)) if !version.is_empty() => Ok(version),
        _ => Err(WallpaperError::Provider(format!(
            "upscaler model {model} is not pinned to a version"
        ))),
    }
}

impl ReplicateClient {
    /// New client authenticating with `api_token`
    pub fn new(client: reqwest::Client, api_token: &str) -> Self {
        Self {
            client,
            api_token: api_token.to_string(),
        }
    }

    async fn read_prediction(
        what: &str,
        resp: reqwest::Response,
    ) -> Result<PredictionResponse, WallpaperError> {
        let status = resp.status();
        if !status.is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("Replicate {what} failed: {status} - {error_text}");
            return Err(if is_transient_status(status) {
                WallpaperError::Transient(message)
            } else {
                WallpaperError::Provider(message)
            });
        }
        resp.json().await.map_err(|err| {
            WallpaperError::Provider(format!("Failed to parse Replicate {what} response: {err}"))
        })
    }

    async fn create_prediction(
        &self,
        version: &str,
        input: serde_json::Value,
    ) -> Result<PredictionResponse, WallpaperError> {
        let resp = self
            .client
            .post(format!("{REPLICATE_API_BASE}/predictions"))
            .header("Authorization", format!("Token {}", self.api_token))
            .json(&json!({
                "version": version,
                "input": input,
            }))
            .send()
            .await?;
        Self::read_prediction("create prediction", resp).await
    }

    async fn get_prediction(&self, id: &str) -> Result<PredictionResponse, WallpaperError> {
        let resp = self
            .client
            .get(format!("{REPLICATE_API_BASE}/predictions/{id}"))
            .header("Authorization", format!("Token {}", self.api_token))
            .send()
            .await?;
        Self::read_prediction("get prediction", resp).await
    }
}

/// Where a prediction stands: its output once it succeeded, an error once it
/// failed or was canceled, otherwise pending.
fn prediction_state(
    prediction: &PredictionResponse,
) -> Result<Poll<serde_json::Value>, WallpaperError> {
    match prediction.status.as_str() {
        "succeeded" => Ok(Poll::Ready(
            prediction.output.clone().unwrap_or(serde_json::Value::Null),
        )),
        "failed" => {
            let error = prediction
                .error
                .as_ref()
                .map(|err| err.to_string())
                .unwrap_or_else(|| "Unknown error".to_string());
            Err(WallpaperError::Provider(format!(
                "Replicate prediction failed: {error}"
            )))
        }
        "canceled" => Err(WallpaperError::Provider(
            "Replicate prediction was canceled".to_string(),
        )),
        _ => Ok(Poll::Pending),
    }
}

/// Checks `prediction` up to `max_polls` times, fetching a fresh copy with
/// `refresh` after each `interval` until it settles.
async fn wait_for_prediction<F, Fut>(
    mut prediction: PredictionResponse,
    max_polls: u32,
    interval: Duration,
    mut refresh: F,
) -> Result<serde_json::Value, WallpaperError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<PredictionResponse, WallpaperError>>,
{
    for attempt in 1..=max_polls {
        if let Poll::Ready(output) = prediction_state(&prediction)? {
            tracing::info!(
                prediction_id = %prediction.id,
                attempts = attempt,
                "Replicate prediction completed"
            );
            return Ok(output);
        }
        tracing::debug!(
            prediction_id = %prediction.id,
            attempt,
            status = %prediction.status,
            "Waiting for Replicate prediction"
        );
        if attempt < max_polls {
            sleep(interval).await;
            prediction = refresh(prediction.id.clone()).await?;
        }
    }

    Err(WallpaperError::ProviderTimeout {
        attempts: max_polls,
    })
}

#[async_trait]
impl Upscaler for ReplicateClient {
    async fn upscale(
        &self,
        model: &str,
        image_url: &str,
        scale: u32,
        face_enhance: bool,
    ) -> Result<serde_json::Value, WallpaperError> {
        let version = model_version(model)?;
        let prediction = self
            .create_prediction(
                version,
                json!({
                    "image": image_url,
                    "scale": scale,
                    "face_enhance": face_enhance,
                }),
            )
            .await?;
        wait_for_prediction(
            prediction,
            PREDICTION_MAX_POLLS,
            PREDICTION_POLL_INTERVAL,
            |id| async move { self.get_prediction(&id).await },
        )
        .await
    }
}
