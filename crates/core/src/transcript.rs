//! Transcription result types

use serde::{Deserialize, Serialize};

/// Result of transcribing one utterance. Ephemeral, produced per cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Transcribed text, trimmed
    pub text: String,
    /// Backend confidence (0.0 - 1.0)
    pub confidence: f32,
    /// BCP-47-ish language tag reported by the backend, if any
    pub language: Option<String>,
}

impl TranscriptionResult {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// True when the backend heard nothing usable
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
