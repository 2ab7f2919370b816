//! Band-energy spectral features
//!
//! Shared by the acoustic wake-word matcher and the speaker verifier. The
//! features are deliberately simple: a real FFT over one frame, magnitudes
//! grouped into a small number of linear bands, log-compressed. Deterministic
//! for identical input.

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Floor added before log compression to keep silence finite
const LOG_FLOOR: f32 = 1e-10;

/// Per-frame band-energy extractor
pub struct FeatureExtractor {
    fft: Arc<dyn RealToComplex<f32>>,
    fft_len: usize,
    bands: usize,
}

impl FeatureExtractor {
    /// `frame_len` is the expected samples per frame; `bands` the number of
    /// spectral bands in the output vector.
    pub fn new(frame_len: usize, bands: usize) -> Self {
        let fft_len = frame_len.next_power_of_two();
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_len);
        Self {
            fft,
            fft_len,
            bands,
        }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// Log band energies for one frame. Input shorter than the FFT length is
    /// zero-padded; longer input is truncated.
    pub fn band_energies(&self, samples: &[f32]) -> Vec<f32> {
        let mut input = vec![0.0f32; self.fft_len];
        let take = samples.len().min(self.fft_len);
        input[..take].copy_from_slice(&samples[..take]);

        let mut spectrum = self.fft.make_output_vec();
        if let Err(e) = self.fft.process(&mut input, &mut spectrum) {
            tracing::error!("FFT failed: {}", e);
            return vec![0.0; self.bands];
        }

        let bins = spectrum.len();
        let bins_per_band = (bins / self.bands).max(1);

        let mut energies = vec![0.0f32; self.bands];
        for (i, c) in spectrum.iter().enumerate() {
            let band = (i / bins_per_band).min(self.bands - 1);
            energies[band] += c.norm_sqr();
        }

        for e in energies.iter_mut() {
            *e = (*e + LOG_FLOOR).log10();
        }
        energies
    }
}

/// Cosine similarity between two equal-length vectors; 0.0 when either is null
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_energies_shape() {
        let extractor = FeatureExtractor::new(320, 16);
        let energies = extractor.band_energies(&vec![0.1f32; 320]);
        assert_eq!(energies.len(), 16);
    }

    #[test]
    fn test_band_energies_deterministic() {
        let extractor = FeatureExtractor::new(320, 16);
        let samples: Vec<f32> = (0..320).map(|i| (i as f32 * 0.05).sin() * 0.4).collect();
        let a = extractor.band_energies(&samples);
        let b = extractor.band_energies(&samples);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tone_concentrates_energy() {
        let extractor = FeatureExtractor::new(512, 16);
        // 1kHz tone at 16kHz lands in a low band
        let tone: Vec<f32> = (0..512)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 16000.0).sin())
            .collect();
        let energies = extractor.band_energies(&tone);
        let max_band = energies
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!(max_band < 4, "tone energy in band {}", max_band);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = [1.0, 0.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        let c = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[]), 0.0);
    }
}
