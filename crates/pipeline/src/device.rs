//! Audio capture and playback device abstraction
//!
//! The physical microphone sits behind [`AudioSource`]; playback behind
//! [`AudioSink`]. [`CaptureStream`] wraps a source with bounded
//! exponential-backoff reopen so a transient device failure does not kill
//! the session.

use mars_core::{AudioFrame, Channels, SampleRate};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::PipelineError;

/// Capture configuration shared by all sources
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: SampleRate,
    pub channels: Channels,
    pub frame_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        use mars_config::constants::audio::{FRAME_MS, SAMPLE_RATE};
        Self {
            sample_rate: SampleRate::from_u32(SAMPLE_RATE).unwrap_or_default(),
            channels: Channels::Mono,
            frame_ms: FRAME_MS,
        }
    }
}

/// A continuous source of fixed-duration PCM frames.
///
/// Implementations guarantee monotonically increasing timestamps and
/// sequence numbers with no gaps under normal operation. `read_frame`
/// blocks until a full frame is available.
pub trait AudioSource: Send {
    fn read_frame(&mut self) -> Result<AudioFrame, PipelineError>;

    fn close(&mut self);

    fn config(&self) -> &CaptureConfig;
}

/// Playback output. `play_chunk` writes samples to the device and returns
/// once they are queued; it must not block for the full chunk duration.
pub trait AudioSink: Send + Sync {
    fn play_chunk(&self, samples: &[f32], sample_rate: SampleRate) -> Result<(), PipelineError>;
}

/// Sink that discards audio, counting samples. Used when no output device
/// is configured and in tests.
#[derive(Default)]
pub struct NullSink {
    played: AtomicUsize,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples_played(&self) -> usize {
        self.played.load(Ordering::Relaxed)
    }
}

impl AudioSink for NullSink {
    fn play_chunk(&self, samples: &[f32], _sample_rate: SampleRate) -> Result<(), PipelineError> {
        self.played.fetch_add(samples.len(), Ordering::Relaxed);
        Ok(())
    }
}

/// Replays a WAV file as fixed-duration frames.
///
/// Stereo input is downmixed and off-rate input resampled at open, so the
/// rest of the pipeline always sees the configured rate. Returns
/// [`PipelineError::StreamClosed`] once the file is exhausted.
pub struct WavSource {
    config: CaptureConfig,
    samples: Vec<f32>,
    cursor: usize,
    sequence: u64,
    started_at: Instant,
    closed: bool,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, config: CaptureConfig) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| PipelineError::Device(format!("failed to open {}: {}", path.display(), e)))?;
        let spec = reader.spec();

        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<Result<_, _>>()
                    .map_err(|e| PipelineError::Device(e.to_string()))?
            },
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| PipelineError::Device(e.to_string()))?,
        };

        let mono: Vec<f32> = if spec.channels > 1 {
            raw.chunks(spec.channels as usize)
                .map(|c| c.iter().sum::<f32>() / c.len() as f32)
                .collect()
        } else {
            raw
        };

        let samples = match SampleRate::from_u32(spec.sample_rate) {
            Some(rate) if rate == config.sample_rate => mono,
            Some(rate) => {
                let frame = AudioFrame::new(mono, rate, Channels::Mono, 0);
                frame.resample(config.sample_rate).samples.to_vec()
            },
            None => {
                return Err(PipelineError::Device(format!(
                    "unsupported WAV sample rate {}",
                    spec.sample_rate
                )))
            },
        };

        tracing::debug!(
            path = %path.display(),
            samples = samples.len(),
            rate = config.sample_rate.as_u32(),
            "WAV source opened"
        );

        Ok(Self {
            config,
            samples,
            cursor: 0,
            sequence: 0,
            started_at: Instant::now(),
            closed: false,
        })
    }

    /// Build a source from raw samples, for tests and scripted sessions
    pub fn from_samples(samples: Vec<f32>, config: CaptureConfig) -> Self {
        Self {
            config,
            samples,
            cursor: 0,
            sequence: 0,
            started_at: Instant::now(),
            closed: false,
        }
    }
}

impl AudioSource for WavSource {
    fn read_frame(&mut self) -> Result<AudioFrame, PipelineError> {
        if self.closed || self.cursor >= self.samples.len() {
            return Err(PipelineError::StreamClosed);
        }

        let frame_len = self.config.sample_rate.samples_for_ms(self.config.frame_ms);
        let end = (self.cursor + frame_len).min(self.samples.len());
        let mut chunk = self.samples[self.cursor..end].to_vec();
        chunk.resize(frame_len, 0.0);
        self.cursor = end;

        // Synthetic timestamps paced by frame position keep ordering monotonic
        let timestamp =
            self.started_at + Duration::from_millis(self.sequence * self.config.frame_ms as u64);
        let frame = AudioFrame::with_timestamp(
            chunk,
            self.config.sample_rate,
            self.config.channels,
            self.sequence,
            timestamp,
        );
        self.sequence += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

/// Reopen policy for a failed capture device
#[derive(Debug, Clone)]
pub struct ReopenPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReopenPolicy {
    fn default() -> Self {
        use mars_config::constants::backoff::{INITIAL_MS, MAX_ATTEMPTS, MAX_MS};
        Self {
            initial_delay: Duration::from_millis(INITIAL_MS),
            max_delay: Duration::from_millis(MAX_MS),
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

/// Factory that can reopen the underlying device after a failure
pub type SourceFactory =
    Box<dyn Fn() -> Result<Box<dyn AudioSource>, PipelineError> + Send + Sync>;

/// A capture stream with automatic reopen.
///
/// On a device error, retries opening with exponential backoff up to
/// `max_attempts`, then gives up with the original error so the caller can
/// report to the user.
pub struct CaptureStream {
    source: Box<dyn AudioSource>,
    factory: SourceFactory,
    policy: ReopenPolicy,
}

impl CaptureStream {
    pub fn new(source: Box<dyn AudioSource>, factory: SourceFactory, policy: ReopenPolicy) -> Self {
        Self {
            source,
            factory,
            policy,
        }
    }

    pub fn config(&self) -> CaptureConfig {
        self.source.config().clone()
    }

    /// Read the next frame, reopening the device if necessary.
    pub async fn next_frame(&mut self) -> Result<AudioFrame, PipelineError> {
        match self.source.read_frame() {
            Ok(frame) => Ok(frame),
            Err(PipelineError::StreamClosed) => Err(PipelineError::StreamClosed),
            Err(PipelineError::Device(reason)) => {
                tracing::warn!(%reason, "Audio device failed, attempting reopen");
                self.reopen().await?;
                self.source.read_frame()
            },
            Err(e) => Err(e),
        }
    }

    async fn reopen(&mut self) -> Result<(), PipelineError> {
        let mut delay = self.policy.initial_delay;
        let mut last_err = None;

        for attempt in 1..=self.policy.max_attempts {
            tokio::time::sleep(delay).await;
            match (self.factory)() {
                Ok(source) => {
                    tracing::info!(attempt, "Audio device reopened");
                    self.source = source;
                    return Ok(());
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Audio device reopen failed");
                    last_err = Some(e);
                    delay = (delay * 2).min(self.policy.max_delay);
                },
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::Device("device unavailable".to_string())))
    }
}
