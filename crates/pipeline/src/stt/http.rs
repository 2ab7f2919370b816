//! HTTP transcription backend
//!
//! Sends the utterance as raw PCM16 to the Whisper sidecar service and parses
//! its JSON response. The service is stateless per request; no streaming.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use mars_config::SttConfig;
use mars_core::{TranscriptionResult, Utterance};

use super::Transcriber;
use crate::PipelineError;

/// Response body from the transcription service
#[derive(Debug, Deserialize)]
struct SttResponse {
    text: String,
    confidence: f32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpTranscriber {
    config: SttConfig,
    client: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(config: SttConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                PipelineError::Transcription(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(
            url = %config.url,
            model = %config.whisper_model,
            language = %config.language,
            "HTTP transcription backend configured"
        );
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        utterance: &Utterance,
    ) -> Result<TranscriptionResult, PipelineError> {
        if utterance.is_empty() {
            return Err(PipelineError::Transcription(
                "empty utterance".to_string(),
            ));
        }

        let url = format!("{}/transcribe", self.config.url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "audio/pcm")
            .header("X-Language", &self.config.language)
            .header("X-Model", &self.config.whisper_model)
            .body(utterance.to_pcm16())
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Transcription(format!(
                "service returned {}",
                response.status()
            )));
        }

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Transcription(format!("malformed response: {}", e)))?;

        if let Some(error) = body.error {
            return Err(PipelineError::Transcription(error));
        }

        let result = TranscriptionResult {
            text: body.text.trim().to_string(),
            confidence: body.confidence,
            language: body.language,
        };
        if result.is_empty() {
            return Err(PipelineError::Transcription(
                "no speech recognized".to_string(),
            ));
        }

        tracing::debug!(
            text = %result.text,
            confidence = result.confidence,
            "Transcription complete"
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "whisper-http"
    }
}
