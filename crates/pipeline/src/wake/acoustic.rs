//! Statistical acoustic wake-word matcher
//!
//! Matches a sliding window of spectral band energies against an enrolled
//! phrase template. Each frame's band vector is mean-normalized so scoring is
//! insensitive to overall loudness; the window score is the cosine similarity
//! of the flattened window against the flattened template.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;

use mars_core::AudioFrame;

use super::{DetectionEvent, WakeWordEngine};
use crate::spectral::{cosine_similarity, FeatureExtractor};
use crate::PipelineError;

/// Enrolled spectral template for one wake phrase.
///
/// Produced by the external enrollment tooling; `frames` holds one
/// mean-normalized band-energy vector per captured frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseTemplate {
    pub phrase: String,
    pub bands: usize,
    pub frames: Vec<Vec<f32>>,
}

impl PhraseTemplate {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Detection(format!("{}: {}", path.display(), e)))?;
        let template: PhraseTemplate = serde_json::from_str(&data)
            .map_err(|e| PipelineError::Detection(format!("malformed template: {}", e)))?;
        if template.frames.is_empty() {
            return Err(PipelineError::Detection("empty wake template".to_string()));
        }
        Ok(template)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let data = serde_json::to_string(self)
            .map_err(|e| PipelineError::Detection(e.to_string()))?;
        std::fs::write(path, data).map_err(|e| PipelineError::Detection(e.to_string()))
    }

    /// Build a template from a recorded sample of the phrase
    pub fn from_samples(
        phrase: impl Into<String>,
        samples: &[f32],
        frame_len: usize,
        bands: usize,
    ) -> Self {
        let extractor = FeatureExtractor::new(frame_len, bands);
        let frames = samples
            .chunks(frame_len)
            .filter(|c| c.len() == frame_len)
            .map(|c| mean_normalize(extractor.band_energies(c)))
            .collect();
        Self {
            phrase: phrase.into(),
            bands,
            frames,
        }
    }
}

fn mean_normalize(mut v: Vec<f32>) -> Vec<f32> {
    if v.is_empty() {
        return v;
    }
    let mean = v.iter().sum::<f32>() / v.len() as f32;
    for x in v.iter_mut() {
        *x -= mean;
    }
    v
}

/// Acoustic matcher state: ring buffer sized to the template length.
pub struct AcousticMatcher {
    template: PhraseTemplate,
    template_flat: Vec<f32>,
    extractor: FeatureExtractor,
    ring: VecDeque<Vec<f32>>,
    /// Voiced flag per frame in the ring; all-silent windows are not scored
    voiced: VecDeque<bool>,
    threshold: f32,
    silence_floor_db: f32,
}

impl AcousticMatcher {
    pub fn new(
        template: PhraseTemplate,
        frame_len: usize,
        threshold: f32,
        silence_floor_db: f32,
    ) -> Self {
        let extractor = FeatureExtractor::new(frame_len, template.bands);
        let template_flat = template.frames.iter().flatten().copied().collect();
        let capacity = template.frames.len();
        Self {
            template,
            template_flat,
            extractor,
            ring: VecDeque::with_capacity(capacity),
            voiced: VecDeque::with_capacity(capacity),
            threshold,
            silence_floor_db,
        }
    }

    fn score_window(&self) -> f32 {
        let window_flat: Vec<f32> = self.ring.iter().flatten().copied().collect();
        cosine_similarity(&window_flat, &self.template_flat)
    }
}

impl WakeWordEngine for AcousticMatcher {
    fn detect(&mut self, frame: &AudioFrame) -> Result<Option<DetectionEvent>, PipelineError> {
        let features = mean_normalize(self.extractor.band_energies(&frame.samples));
        let is_voiced = !frame.is_likely_silence(self.silence_floor_db);

        if self.ring.len() == self.template.frames.len() {
            self.ring.pop_front();
            self.voiced.pop_front();
        }
        self.ring.push_back(features);
        self.voiced.push_back(is_voiced);

        if self.ring.len() < self.template.frames.len() {
            return Ok(None);
        }
        if !self.voiced.iter().any(|&v| v) {
            return Ok(None);
        }

        let score = self.score_window();
        if score >= self.threshold {
            self.ring.clear();
            self.voiced.clear();
            return Ok(Some(DetectionEvent {
                score,
                sequence: frame.sequence,
                timestamp: frame.timestamp,
            }));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.ring.clear();
        self.voiced.clear();
    }

    fn name(&self) -> &'static str {
        "acoustic"
    }
}
