//! Wake-word detection
//!
//! Two interchangeable engines behind [`WakeWordEngine`]:
//! - [`AcousticMatcher`]: statistical matcher against an enrolled phrase
//!   template (spectral band energies, cosine scoring)
//! - [`KeywordSpotter`]: lightweight energy-envelope spotter used when no
//!   template is available
//!
//! [`WakeWordDetector`] wraps the active engine with a retrigger cooldown so
//! the utterance following a detection cannot fire the detector again.

mod acoustic;
mod keyword;

pub use acoustic::{AcousticMatcher, PhraseTemplate};
pub use keyword::KeywordSpotter;

use mars_config::{WakeConfig, WakeEngineKind};
use mars_core::AudioFrame;
use std::time::{Duration, Instant};

use crate::PipelineError;

/// Emitted when the wake phrase is heard
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    /// Match score (0-1)
    pub score: f32,
    /// Sequence of the frame that completed the detection
    pub sequence: u64,
    /// Capture timestamp of that frame
    pub timestamp: Instant,
}

/// A wake-word engine processes one frame at a time; detection latency is
/// bounded by a single frame.
pub trait WakeWordEngine: Send {
    fn detect(&mut self, frame: &AudioFrame) -> Result<Option<DetectionEvent>, PipelineError>;

    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Wake-word detector: active engine plus retrigger suppression.
pub struct WakeWordDetector {
    engine: Box<dyn WakeWordEngine>,
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

impl WakeWordDetector {
    pub fn new(engine: Box<dyn WakeWordEngine>, cooldown: Duration) -> Self {
        Self {
            engine,
            cooldown,
            last_trigger: None,
        }
    }

    /// Feed one frame; returns a detection unless still inside the cooldown
    /// window of the previous one.
    pub fn feed(&mut self, frame: &AudioFrame) -> Result<Option<DetectionEvent>, PipelineError> {
        let event = match self.engine.detect(frame)? {
            Some(event) => event,
            None => return Ok(None),
        };

        if let Some(last) = self.last_trigger {
            if event.timestamp.duration_since(last) < self.cooldown {
                tracing::debug!(
                    sequence = event.sequence,
                    "Wake trigger suppressed inside cooldown window"
                );
                return Ok(None);
            }
        }

        self.last_trigger = Some(event.timestamp);
        tracing::info!(
            engine = self.engine.name(),
            score = format!("{:.2}", event.score),
            sequence = event.sequence,
            "Wake word detected"
        );
        Ok(Some(event))
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }
}

/// Build the configured engine, falling back to the keyword spotter when the
/// acoustic template cannot be loaded (missing file, wrong format).
pub fn create_wake_engine(
    config: &WakeConfig,
    wake_word: &str,
    frame_len: usize,
    frame_ms: u32,
    silence_floor_db: f32,
) -> Box<dyn WakeWordEngine> {
    match config.engine {
        WakeEngineKind::Model => {
            let template_path = config.template_path.as_deref();
            match template_path {
                Some(path) => match PhraseTemplate::load(path) {
                    Ok(template) => {
                        tracing::info!(path, "Using acoustic wake-word matcher");
                        return Box::new(AcousticMatcher::new(
                            template,
                            frame_len,
                            config.threshold,
                            silence_floor_db,
                        ));
                    },
                    Err(e) => {
                        tracing::warn!(
                            path,
                            error = %e,
                            "Failed to load wake template, falling back to keyword spotter"
                        );
                    },
                },
                None => {
                    tracing::warn!(
                        "No wake template configured, falling back to keyword spotter"
                    );
                },
            }
            Box::new(KeywordSpotter::new(
                wake_word,
                config.window_ms,
                frame_ms,
                silence_floor_db,
            ))
        },
        WakeEngineKind::Keyword => Box::new(KeywordSpotter::new(
            wake_word,
            config.window_ms,
            frame_ms,
            silence_floor_db,
        )),
    }
}
