//! Lightweight keyword spotter
//!
//! Fallback wake engine that needs no model or template. Tracks the energy
//! envelope over a sliding window and fires when the number of voiced bursts
//! matches the word count of the wake phrase and the phrase has ended
//! (trailing silence). Coarse by design; the acoustic matcher is preferred
//! when a template exists.

use mars_core::AudioFrame;
use std::collections::VecDeque;

use super::{DetectionEvent, WakeWordEngine};
use crate::PipelineError;

/// A voiced run shorter than this many frames is treated as a click, not a word
const MIN_BURST_FRAMES: usize = 3;

pub struct KeywordSpotter {
    /// Number of words in the wake phrase
    expected_bursts: usize,
    window_frames: usize,
    silence_floor_db: f32,
    /// Voiced flag per frame in the sliding window
    envelope: VecDeque<bool>,
}

impl KeywordSpotter {
    pub fn new(wake_word: &str, window_ms: u32, frame_ms: u32, silence_floor_db: f32) -> Self {
        let expected_bursts = wake_word.split_whitespace().count().max(1);
        let window_frames = (window_ms / frame_ms.max(1)).max(1) as usize;
        Self {
            expected_bursts,
            window_frames,
            silence_floor_db,
            envelope: VecDeque::with_capacity(window_frames),
        }
    }

    fn count_bursts(&self) -> usize {
        let mut bursts = 0;
        let mut run = 0usize;
        for &voiced in &self.envelope {
            if voiced {
                run += 1;
            } else {
                if run >= MIN_BURST_FRAMES {
                    bursts += 1;
                }
                run = 0;
            }
        }
        if run >= MIN_BURST_FRAMES {
            bursts += 1;
        }
        bursts
    }
}

impl WakeWordEngine for KeywordSpotter {
    fn detect(&mut self, frame: &AudioFrame) -> Result<Option<DetectionEvent>, PipelineError> {
        let is_voiced = !frame.is_likely_silence(self.silence_floor_db);

        if self.envelope.len() == self.window_frames {
            self.envelope.pop_front();
        }
        self.envelope.push_back(is_voiced);

        // Only evaluate once the phrase has plausibly ended
        if is_voiced {
            return Ok(None);
        }

        if self.count_bursts() == self.expected_bursts {
            self.envelope.clear();
            return Ok(Some(DetectionEvent {
                score: 1.0,
                sequence: frame.sequence,
                timestamp: frame.timestamp,
            }));
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.envelope.clear();
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
