//! Speech-to-text
//!
//! One backend trait; the production implementation calls the external
//! Whisper sidecar over HTTP. Tests substitute in-memory transcribers.

mod http;

pub use http::HttpTranscriber;

use async_trait::async_trait;
use mars_core::{TranscriptionResult, Utterance};

use crate::PipelineError;

/// Turns a completed utterance into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, utterance: &Utterance) -> Result<TranscriptionResult, PipelineError>;

    fn name(&self) -> &'static str;
}
