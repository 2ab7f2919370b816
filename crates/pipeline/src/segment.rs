//! Utterance segmentation
//!
//! After a wake trigger, frames accumulate into an [`Utterance`] until either
//! the trailing silence exceeds the endpoint threshold or the utterance hits
//! the duration ceiling. A cycle that collected no voiced frames at all is a
//! false trigger and yields nothing.

use std::time::Duration;

use mars_config::SegmentationConfig;
use mars_core::{AudioFrame, SampleRate, Utterance};

/// Outcome of feeding one frame to the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentProgress {
    /// Still inside the utterance
    Collecting,
    /// Trailing silence reached the endpoint threshold
    Endpointed,
    /// Duration ceiling reached; the utterance is cut here
    MaxDurationReached,
}

/// Collects post-trigger frames into a single utterance.
///
/// One collector serves one listen cycle; the orchestrator constructs a fresh
/// one per wake trigger.
pub struct UtteranceCollector {
    utterance: Utterance,
    silence_floor_db: f32,
    endpoint_silence: Duration,
    max_duration: Duration,
    trailing_silence: Duration,
    elapsed: Duration,
    done: bool,
}

impl UtteranceCollector {
    pub fn new(sample_rate: SampleRate, config: &SegmentationConfig, silence_floor_db: f32) -> Self {
        Self {
            utterance: Utterance::new(sample_rate),
            silence_floor_db,
            endpoint_silence: Duration::from_millis(config.endpoint_silence_ms as u64),
            max_duration: Duration::from_millis(config.max_utterance_ms as u64),
            trailing_silence: Duration::ZERO,
            elapsed: Duration::ZERO,
            done: false,
        }
    }

    /// Append one frame and report whether the utterance is complete.
    ///
    /// Frames fed after completion are ignored.
    pub fn push(&mut self, frame: &AudioFrame) -> SegmentProgress {
        if self.done {
            return SegmentProgress::Endpointed;
        }

        let voiced = !frame.is_likely_silence(self.silence_floor_db);
        self.utterance.push(frame, voiced);
        self.elapsed += frame.duration;

        if voiced {
            self.trailing_silence = Duration::ZERO;
        } else {
            self.trailing_silence += frame.duration;
        }

        if self.elapsed >= self.max_duration {
            self.done = true;
            tracing::warn!(
                elapsed_ms = self.elapsed.as_millis() as u64,
                "Utterance cut at duration ceiling"
            );
            return SegmentProgress::MaxDurationReached;
        }

        // Endpoint only after some speech was heard
        if self.utterance.voiced_frames() > 0 && self.trailing_silence >= self.endpoint_silence {
            self.done = true;
            return SegmentProgress::Endpointed;
        }

        // A cycle that never hears speech gives up after the endpoint window
        if self.utterance.voiced_frames() == 0 && self.elapsed >= self.endpoint_silence {
            self.done = true;
            return SegmentProgress::Endpointed;
        }

        SegmentProgress::Collecting
    }

    /// Finish the cycle. Returns `None` when no voiced frame was collected,
    /// which marks the wake trigger as false.
    pub fn finish(self) -> Option<Utterance> {
        if self.utterance.voiced_frames() == 0 {
            tracing::debug!("No speech after wake trigger, discarding cycle");
            return None;
        }
        tracing::debug!(
            frames = self.utterance.frame_count(),
            voiced = self.utterance.voiced_frames(),
            duration_ms = self.utterance.duration().as_millis() as u64,
            "Utterance complete"
        );
        Some(self.utterance)
    }
}
