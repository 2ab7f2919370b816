//! Core types for the MARS voice assistant
//!
//! This crate provides the data model shared across all other crates:
//! - Audio frame and utterance types
//! - Transcription results
//! - The enrolled voice profile

pub mod audio;
pub mod profile;
pub mod transcript;

pub use audio::{AudioFrame, Channels, SampleRate, Utterance};
pub use profile::{ProfileError, VoiceProfile};
pub use transcript::TranscriptionResult;
