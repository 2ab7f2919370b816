//! Centralized constants for the MARS assistant
//!
//! Single source of truth for audio parameters and default thresholds, so
//! values are not duplicated across crates.

/// Audio capture constants
pub mod audio {
    /// Capture sample rate (Hz) for the whole pipeline
    pub const SAMPLE_RATE: u32 = 16_000;

    /// Capture frame duration (ms)
    pub const FRAME_MS: u32 = 20;

    /// Energy floor below which a frame is treated as silence (dB)
    pub const SILENCE_FLOOR_DB: f32 = -45.0;

    /// PCM16 normalization divisor (decode)
    pub const PCM16_NORMALIZE: f32 = 32768.0;

    /// PCM16 scale factor (encode)
    pub const PCM16_SCALE: f32 = 32767.0;
}

/// Wake-word detection constants
pub mod wake {
    /// Sliding analysis window over recent frames (ms)
    pub const WINDOW_MS: u32 = 2_000;

    /// Retrigger suppression window after a detection (ms)
    pub const COOLDOWN_MS: u32 = 2_000;

    /// Default acceptance score for the acoustic matcher (0-1)
    pub const ACOUSTIC_THRESHOLD: f32 = 0.80;

    /// Spectral bands used by the acoustic matcher and speaker embedding
    pub const SPECTRAL_BANDS: usize = 16;
}

/// Utterance segmentation constants
pub mod segmentation {
    /// Trailing silence that ends an utterance (ms)
    pub const ENDPOINT_SILENCE_MS: u32 = 1_500;

    /// Hard ceiling on utterance duration (ms)
    pub const MAX_UTTERANCE_MS: u32 = 30_000;
}

/// Speaker verification constants
pub mod verification {
    /// Cosine-similarity acceptance threshold
    pub const THRESHOLD: f32 = 0.75;

    /// Dimensions of the speaker embedding (bands x {mean, stddev})
    pub const EMBEDDING_DIMS: usize = 32;
}

/// Timeouts (milliseconds)
pub mod timeouts {
    /// Skill execution bound enforced per invocation
    pub const SKILL_TIMEOUT_MS: u64 = 10_000;

    /// Transcription backend request timeout
    pub const STT_TIMEOUT_MS: u64 = 30_000;

    /// Synthesis backend request timeout
    pub const TTS_TIMEOUT_MS: u64 = 15_000;
}

/// Device reopen backoff
pub mod backoff {
    /// First retry delay (ms)
    pub const INITIAL_MS: u64 = 250;

    /// Delay ceiling (ms)
    pub const MAX_MS: u64 = 8_000;

    /// Attempts before giving up and reporting to the user
    pub const MAX_ATTEMPTS: u32 = 6;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Local Whisper-compatible transcription service
    pub const STT_DEFAULT: &str = "http://127.0.0.1:8090";

    /// Remote speech synthesis service
    pub const TTS_DEFAULT: &str = "http://127.0.0.1:8091";

    /// Weather service used by the built-in weather skill
    pub const WEATHER_DEFAULT: &str = "http://127.0.0.1:8092";
}
