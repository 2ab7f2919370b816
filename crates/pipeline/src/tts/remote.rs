//! Remote HTTP synthesis engine
//!
//! Posts the response text to the synthesis service and expects raw PCM16 at
//! 22.05kHz back. Network or service failures surface as synthesis errors so
//! the fallback engine takes over.

use async_trait::async_trait;
use std::time::Duration;

use mars_config::TtsConfig;
use mars_core::SampleRate;

use super::{SynthesisEngine, SynthesizedAudio};
use crate::PipelineError;

pub struct RemoteSynthesisEngine {
    config: TtsConfig,
    client: reqwest::Client,
}

impl RemoteSynthesisEngine {
    pub fn new(config: TtsConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                PipelineError::Synthesis(format!("failed to create HTTP client: {}", e))
            })?;

        tracing::info!(url = %config.url, "Remote synthesis engine configured");
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SynthesisEngine for RemoteSynthesisEngine {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::Synthesis("empty text".to_string()));
        }

        let url = format!("{}/synthesize", self.config.url);
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(text.to_string());
        if let Some(voice) = &self.config.voice_id {
            request = request.header("X-Voice-Id", voice);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Synthesis(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Synthesis(format!(
                "service returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Synthesis(format!("body read failed: {}", e)))?;
        if bytes.len() < 2 {
            return Err(PipelineError::Synthesis("empty audio response".to_string()));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
            .collect();

        Ok(SynthesizedAudio {
            samples,
            sample_rate: SampleRate::Hz22050,
        })
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
