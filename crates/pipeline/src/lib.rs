//! Voice pipeline components for MARS
//!
//! Everything between the microphone and the skill layer:
//! - Audio capture behind the [`device::AudioSource`] trait, with bounded
//!   exponential-backoff reopen on device failure
//! - Wake-word detection (acoustic matcher or keyword spotter)
//! - Utterance segmentation (silence endpointing vs. duration ceiling)
//! - Speaker verification against the enrolled profile
//! - Transcription and speech synthesis backends

pub mod device;
pub mod segment;
pub mod spectral;
pub mod stt;
pub mod tts;
pub mod verify;
pub mod wake;

use mars_core::ProfileError;
use thiserror::Error;

/// Error taxonomy for the pipeline.
///
/// Device and profile errors are fatal at startup; the rest are recovered
/// per cycle by the orchestrator.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("audio device error: {0}")]
    Device(String),

    /// The frame source ended (file replay ran out, device closed cleanly)
    #[error("audio stream closed")]
    StreamClosed,

    #[error("wake-word backend error: {0}")]
    Detection(String),

    #[error("speaker verification error: {0}")]
    Verification(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}
