//! Speech synthesis
//!
//! [`ResponseSynthesizer`] owns a primary and a fallback engine; when the
//! primary fails the response is re-rendered by the fallback and the failure
//! is logged, never surfaced as a dropped reply. Playback runs on a spawned
//! task in paced chunks so a wake trigger can cancel it mid-sentence.

mod local;
mod remote;

pub use local::LocalSynthesisEngine;
pub use remote::RemoteSynthesisEngine;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use mars_core::SampleRate;

use crate::device::AudioSink;
use crate::PipelineError;

/// Samples per playback chunk, expressed as a duration
const CHUNK_MS: u64 = 100;

/// Rendered speech ready for playback
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: SampleRate,
}

impl SynthesizedAudio {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.as_u32() as f64)
    }
}

/// A synthesis engine renders text to audio. Engines are stateless across
/// calls; per-call failures are returned, not retried internally.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, PipelineError>;

    fn name(&self) -> &'static str;
}

/// Handle to an in-flight playback.
///
/// `cancel` is idempotent and non-blocking; the playback task observes the
/// flag at the next chunk boundary.
#[derive(Clone)]
pub struct PlaybackHandle {
    cancelled: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the playback task has run to completion (or been cancelled)
    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| t.is_finished())
            .unwrap_or(true)
    }

    /// Wait for playback to finish (or for a cancel to take effect)
    pub async fn wait(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Primary/fallback synthesis pair bound to an output sink.
pub struct ResponseSynthesizer {
    primary: Box<dyn SynthesisEngine>,
    fallback: Box<dyn SynthesisEngine>,
    sink: Arc<dyn AudioSink>,
}

impl ResponseSynthesizer {
    pub fn new(
        primary: Box<dyn SynthesisEngine>,
        fallback: Box<dyn SynthesisEngine>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            primary,
            fallback,
            sink,
        }
    }

    /// Render and start playing `text`. Falls back to the secondary engine
    /// when the primary fails; errors only when both engines fail.
    pub async fn speak(&self, text: &str) -> Result<PlaybackHandle, PipelineError> {
        let audio = match self.primary.synthesize(text).await {
            Ok(audio) => audio,
            Err(primary_err) => {
                tracing::warn!(
                    engine = self.primary.name(),
                    error = %primary_err,
                    "Primary synthesis failed, using fallback"
                );
                self.fallback.synthesize(text).await.map_err(|fallback_err| {
                    tracing::error!(
                        engine = self.fallback.name(),
                        error = %fallback_err,
                        "Fallback synthesis failed"
                    );
                    PipelineError::Synthesis(format!(
                        "all engines failed: {}; {}",
                        primary_err, fallback_err
                    ))
                })?
            },
        };

        Ok(self.play(audio))
    }

    fn play(&self, audio: SynthesizedAudio) -> PlaybackHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sink = self.sink.clone();

        let task = tokio::spawn(async move {
            let chunk_len = audio.sample_rate.samples_for_ms(CHUNK_MS as u32).max(1);
            for chunk in audio.samples.chunks(chunk_len) {
                if flag.load(Ordering::SeqCst) {
                    tracing::debug!("Playback cancelled");
                    return;
                }
                if let Err(e) = sink.play_chunk(chunk, audio.sample_rate) {
                    tracing::warn!(error = %e, "Playback chunk failed, stopping");
                    return;
                }
                // Pace chunks in real time so cancel latency stays bounded
                let chunk_ms = chunk.len() as u64 * 1000 / audio.sample_rate.as_u32() as u64;
                tokio::time::sleep(Duration::from_millis(chunk_ms)).await;
            }
        });

        PlaybackHandle {
            cancelled,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}
