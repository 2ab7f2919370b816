//! Speaker verification
//!
//! Compares an utterance against the enrolled voice profile. The embedding is
//! a summary of the utterance's spectral shape: per-band mean and standard
//! deviation of the frame band energies, L2-normalized. The same function
//! serves enrollment, so runtime and enrolled embeddings are always produced
//! by identical code.

use mars_core::{Utterance, VoiceProfile};

use crate::spectral::{cosine_similarity, FeatureExtractor};
use crate::PipelineError;

/// Outcome of verifying one utterance
#[derive(Debug, Clone, Copy)]
pub struct VerificationResult {
    pub accepted: bool,
    /// Cosine similarity against the enrolled embedding
    pub score: f32,
}

/// Verifies utterances against one enrolled profile.
pub struct SpeakerVerifier {
    profile: VoiceProfile,
    threshold: f32,
    extractor: FeatureExtractor,
    frame_len: usize,
}

impl SpeakerVerifier {
    pub fn new(profile: VoiceProfile, threshold: f32, frame_len: usize, bands: usize) -> Self {
        Self {
            profile,
            threshold,
            extractor: FeatureExtractor::new(frame_len, bands),
            frame_len,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.profile.owner_id
    }

    /// Score the utterance against the enrolled embedding.
    ///
    /// Errors when the utterance is too short to embed or the enrolled
    /// embedding has incompatible dimensions; accept/reject policy on error
    /// belongs to the caller.
    pub fn verify(&self, utterance: &Utterance) -> Result<VerificationResult, PipelineError> {
        let embedding = embed_samples(&self.extractor, self.frame_len, utterance.samples())?;

        if embedding.len() != self.profile.embedding.len() {
            return Err(PipelineError::Verification(format!(
                "embedding dimension mismatch: got {}, profile has {}",
                embedding.len(),
                self.profile.embedding.len()
            )));
        }

        let score = cosine_similarity(&embedding, &self.profile.embedding);
        let accepted = score >= self.threshold;
        tracing::info!(
            score = format!("{:.3}", score),
            threshold = self.threshold,
            accepted,
            "Speaker verification"
        );
        Ok(VerificationResult { accepted, score })
    }
}

/// Compute the speaker embedding for a sample buffer.
///
/// Output is `2 * bands` long: per-band mean followed by per-band standard
/// deviation over all complete frames, L2-normalized. Deterministic for
/// identical input.
pub fn embed_samples(
    extractor: &FeatureExtractor,
    frame_len: usize,
    samples: &[f32],
) -> Result<Vec<f32>, PipelineError> {
    let frames: Vec<Vec<f32>> = samples
        .chunks(frame_len)
        .filter(|c| c.len() == frame_len)
        .map(|c| extractor.band_energies(c))
        .collect();

    if frames.is_empty() {
        return Err(PipelineError::Verification(
            "utterance too short to embed".to_string(),
        ));
    }

    let bands = extractor.bands();
    let n = frames.len() as f32;

    let mut means = vec![0.0f32; bands];
    for frame in &frames {
        for (m, &e) in means.iter_mut().zip(frame) {
            *m += e;
        }
    }
    for m in means.iter_mut() {
        *m /= n;
    }

    let mut stds = vec![0.0f32; bands];
    for frame in &frames {
        for ((s, &e), &m) in stds.iter_mut().zip(frame).zip(&means) {
            let d = e - m;
            *s += d * d;
        }
    }
    for s in stds.iter_mut() {
        *s = (*s / n).sqrt();
    }

    let mut embedding = means;
    embedding.extend(stds);

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in embedding.iter_mut() {
            *x /= norm;
        }
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mars_core::{AudioFrame, Channels, SampleRate};

    const FRAME_LEN: usize = 320;
    const BANDS: usize = 16;

    fn utterance_from(samples: Vec<f32>) -> Utterance {
        let mut utterance = Utterance::new(SampleRate::Hz16000);
        for (seq, chunk) in samples.chunks(FRAME_LEN).enumerate() {
            if chunk.len() < FRAME_LEN {
                break;
            }
            let frame = AudioFrame::new(
                chunk.to_vec(),
                SampleRate::Hz16000,
                Channels::Mono,
                seq as u64,
            );
            utterance.push(&frame, true);
        }
        utterance
    }

    fn voice_like(base_freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16000.0;
                let f0 = (2.0 * std::f32::consts::PI * base_freq * t).sin();
                let f1 = (2.0 * std::f32::consts::PI * base_freq * 2.0 * t).sin() * 0.5;
                (f0 + f1) * 0.3
            })
            .collect()
    }

    fn enrolled(samples: &[f32]) -> VoiceProfile {
        let extractor = FeatureExtractor::new(FRAME_LEN, BANDS);
        let embedding = embed_samples(&extractor, FRAME_LEN, samples).unwrap();
        VoiceProfile::new("alex", embedding, 1)
    }

    #[test]
    fn test_same_voice_accepted() {
        let audio = voice_like(180.0, 16000);
        let verifier = SpeakerVerifier::new(enrolled(&audio), 0.75, FRAME_LEN, BANDS);

        let result = verifier.verify(&utterance_from(audio)).unwrap();
        assert!(result.accepted);
        assert!(result.score > 0.99);
    }

    #[test]
    fn test_different_voice_rejected() {
        let owner = voice_like(180.0, 16000);
        let verifier = SpeakerVerifier::new(enrolled(&owner), 0.95, FRAME_LEN, BANDS);

        // Much higher pitch with different spectral spread
        let other: Vec<f32> = (0..16000)
            .map(|i| {
                let t = i as f32 / 16000.0;
                (2.0 * std::f32::consts::PI * (2500.0 + 1500.0 * t) * t).sin() * 0.3
            })
            .collect();
        let result = verifier.verify(&utterance_from(other)).unwrap();
        assert!(!result.accepted);
    }

    #[test]
    fn test_deterministic_scores() {
        let audio = voice_like(200.0, 16000);
        let verifier = SpeakerVerifier::new(enrolled(&audio), 0.75, FRAME_LEN, BANDS);
        let utterance = utterance_from(audio);

        let a = verifier.verify(&utterance).unwrap();
        let b = verifier.verify(&utterance).unwrap();
        assert_eq!(a.score, b.score);
    }

    #[test]
    fn test_too_short_errors() {
        let audio = voice_like(180.0, 16000);
        let verifier = SpeakerVerifier::new(enrolled(&audio), 0.75, FRAME_LEN, BANDS);

        let empty = Utterance::new(SampleRate::Hz16000);
        assert!(verifier.verify(&empty).is_err());
    }

    #[test]
    fn test_dimension_mismatch_errors() {
        let audio = voice_like(180.0, 16000);
        let profile = VoiceProfile::new("alex", vec![0.5; 8], 1);
        let verifier = SpeakerVerifier::new(profile, 0.75, FRAME_LEN, BANDS);

        assert!(verifier.verify(&utterance_from(audio)).is_err());
    }
}
