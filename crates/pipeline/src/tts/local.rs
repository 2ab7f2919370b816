//! Local offline synthesis engine
//!
//! Always available, never fails for non-empty text, which makes it the
//! default fallback slot. Renders a syllable-paced tone pattern rather than
//! real speech; the audible cue tells the user a response happened even when
//! the remote voice is down.

use async_trait::async_trait;

use mars_core::SampleRate;

use super::{SynthesisEngine, SynthesizedAudio};
use crate::PipelineError;

const RATE: SampleRate = SampleRate::Hz16000;
/// Per-word tone duration plus gap, in samples
const TONE_SAMPLES: usize = 1600;
const GAP_SAMPLES: usize = 800;

pub struct LocalSynthesisEngine;

impl LocalSynthesisEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalSynthesisEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for LocalSynthesisEngine {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(PipelineError::Synthesis("empty text".to_string()));
        }

        let mut samples = Vec::with_capacity(words.len() * (TONE_SAMPLES + GAP_SAMPLES));
        for word in &words {
            // Word length nudges the pitch so longer words sound lower
            let freq = 330.0 + 40.0 / word.len().max(1) as f32 * 4.0;
            for i in 0..TONE_SAMPLES {
                let t = i as f32 / RATE.as_u32() as f32;
                // Short fade at both ends avoids clicks between words
                let edge = (i.min(TONE_SAMPLES - i) as f32 / 160.0).min(1.0);
                samples.push((2.0 * std::f32::consts::PI * freq * t).sin() * 0.2 * edge);
            }
            samples.extend(std::iter::repeat(0.0).take(GAP_SAMPLES));
        }

        tracing::debug!(words = words.len(), "Local synthesis rendered");
        Ok(SynthesizedAudio {
            samples,
            sample_rate: RATE,
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_renders_audio_for_text() {
        let engine = LocalSynthesisEngine::new();
        let audio = engine.synthesize("hello there").await.unwrap();
        assert_eq!(audio.samples.len(), 2 * (TONE_SAMPLES + GAP_SAMPLES));
        assert!(audio.duration().as_millis() > 0);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let engine = LocalSynthesisEngine::new();
        assert!(engine.synthesize("").await.is_err());
    }

    #[tokio::test]
    async fn test_deterministic() {
        let engine = LocalSynthesisEngine::new();
        let a = engine.synthesize("test").await.unwrap();
        let b = engine.synthesize("test").await.unwrap();
        assert_eq!(a.samples, b.samples);
    }
}
