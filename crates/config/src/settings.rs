//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{audio, backoff, endpoints, segmentation, timeouts, verification, wake};
use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Assistant identity
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioConfig,

    /// Wake-word detection
    #[serde(default)]
    pub wake: WakeConfig,

    /// Utterance segmentation
    #[serde(default)]
    pub segmentation: SegmentationConfig,

    /// Speaker verification
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Speech-to-text backend
    #[serde(default)]
    pub stt: SttConfig,

    /// Speech synthesis
    #[serde(default)]
    pub tts: TtsConfig,

    /// Skill routing and execution
    #[serde(default)]
    pub skills: SkillsConfig,
}

/// Assistant identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Spoken name of the assistant
    #[serde(default = "default_assistant_name")]
    pub name: String,

    /// Wake phrase to listen for
    #[serde(default = "default_wake_word")]
    pub wake_word: String,

    /// Owner's name, used in greetings and profile lookup
    #[serde(default = "default_owner")]
    pub owner: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
            wake_word: default_wake_word(),
            owner: default_owner(),
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Frame duration in milliseconds
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Energy floor below which a frame counts as silence (dB)
    #[serde(default = "default_silence_floor_db")]
    pub silence_floor_db: f32,

    /// Device reopen: first retry delay (ms)
    #[serde(default = "default_backoff_initial_ms")]
    pub reopen_initial_ms: u64,

    /// Device reopen: delay ceiling (ms)
    #[serde(default = "default_backoff_max_ms")]
    pub reopen_max_ms: u64,

    /// Device reopen: attempts before giving up
    #[serde(default = "default_backoff_attempts")]
    pub reopen_max_attempts: u32,

    /// WAV file to replay instead of live capture. Live device backends
    /// plug in behind the same source trait.
    #[serde(default)]
    pub input_wav: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_ms: default_frame_ms(),
            silence_floor_db: default_silence_floor_db(),
            reopen_initial_ms: default_backoff_initial_ms(),
            reopen_max_ms: default_backoff_max_ms(),
            reopen_max_attempts: default_backoff_attempts(),
            input_wav: None,
        }
    }
}

/// Wake-word engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WakeEngineKind {
    /// Statistical acoustic-model matcher (requires a phrase template file)
    #[default]
    Model,
    /// Lightweight energy-envelope keyword spotter
    Keyword,
}

/// Wake-word detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Engine to use
    #[serde(default)]
    pub engine: WakeEngineKind,

    /// Path to the acoustic phrase template (model engine only)
    #[serde(default)]
    pub template_path: Option<String>,

    /// Sliding analysis window (ms)
    #[serde(default = "default_wake_window_ms")]
    pub window_ms: u32,

    /// Retrigger suppression window (ms)
    #[serde(default = "default_wake_cooldown_ms")]
    pub cooldown_ms: u32,

    /// Acceptance score for the acoustic matcher (0-1)
    #[serde(default = "default_wake_threshold")]
    pub threshold: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            engine: WakeEngineKind::default(),
            template_path: None,
            window_ms: default_wake_window_ms(),
            cooldown_ms: default_wake_cooldown_ms(),
            threshold: default_wake_threshold(),
        }
    }
}

/// Utterance segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Trailing silence that ends an utterance (ms)
    #[serde(default = "default_endpoint_silence_ms")]
    pub endpoint_silence_ms: u32,

    /// Hard ceiling on utterance duration (ms)
    #[serde(default = "default_max_utterance_ms")]
    pub max_utterance_ms: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            endpoint_silence_ms: default_endpoint_silence_ms(),
            max_utterance_ms: default_max_utterance_ms(),
        }
    }
}

/// Speaker verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Enable speaker verification (unauthenticated mode when false)
    #[serde(default)]
    pub enabled: bool,

    /// Cosine-similarity acceptance threshold
    #[serde(default = "default_verification_threshold")]
    pub threshold: f32,

    /// Path to the enrolled voice profile
    #[serde(default = "default_profile_path")]
    pub profile_path: String,

    /// Skill ids still routable after a rejection (guest mode).
    /// Empty means rejected speakers get an access-denied response.
    #[serde(default)]
    pub guest_skills: Vec<String>,

    /// Consecutive rejections before lockout. None disables the policy.
    #[serde(default)]
    pub max_rejections: Option<u32>,

    /// How long triggers are ignored once locked out (ms)
    #[serde(default = "default_lockout_ms")]
    pub lockout_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: default_verification_threshold(),
            profile_path: default_profile_path(),
            guest_skills: Vec::new(),
            max_rejections: None,
            lockout_ms: default_lockout_ms(),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Transcription service URL
    #[serde(default = "default_stt_url")]
    pub url: String,

    /// Whisper model size requested from the service
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,

    /// Language hint sent to the backend
    #[serde(default = "default_language")]
    pub language: String,

    /// Request timeout (ms)
    #[serde(default = "default_stt_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: default_stt_url(),
            whisper_model: default_whisper_model(),
            language: default_language(),
            timeout_ms: default_stt_timeout_ms(),
        }
    }
}

/// Synthesis engine selection for the primary slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngineKind {
    /// Remote HTTP synthesis service
    Remote,
    /// Local offline engine
    #[default]
    Local,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Primary engine; the local engine always backs it as fallback
    #[serde(default)]
    pub engine: TtsEngineKind,

    /// Remote synthesis service URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// Voice identifier passed to the remote service
    #[serde(default)]
    pub voice_id: Option<String>,

    /// Request timeout (ms)
    #[serde(default = "default_tts_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngineKind::default(),
            url: default_tts_url(),
            voice_id: None,
            timeout_ms: default_tts_timeout_ms(),
        }
    }
}

/// Skill routing and execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Per-invocation execution bound (ms)
    #[serde(default = "default_skill_timeout_ms")]
    pub skill_timeout_ms: u64,

    /// Skill id to route to when nothing matches. None means a
    /// "didn't understand" response.
    #[serde(default)]
    pub catch_all: Option<String>,

    /// Weather service URL for the built-in weather skill
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            skill_timeout_ms: default_skill_timeout_ms(),
            catch_all: None,
            weather_url: default_weather_url(),
        }
    }
}

impl Settings {
    /// Sanity checks that would otherwise surface as confusing runtime faults
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assistant.wake_word.trim().is_empty() {
            return Err(ConfigError::Invalid("wake_word must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.verification.threshold) {
            return Err(ConfigError::Invalid(format!(
                "verification.threshold must be in 0..=1, got {}",
                self.verification.threshold
            )));
        }
        if self.segmentation.endpoint_silence_ms == 0 {
            return Err(ConfigError::Invalid(
                "segmentation.endpoint_silence_ms must be > 0".into(),
            ));
        }
        if self.segmentation.max_utterance_ms <= self.segmentation.endpoint_silence_ms {
            return Err(ConfigError::Invalid(
                "segmentation.max_utterance_ms must exceed endpoint_silence_ms".into(),
            ));
        }
        if self.audio.frame_ms == 0 || self.audio.frame_ms > 100 {
            return Err(ConfigError::Invalid(format!(
                "audio.frame_ms must be in 1..=100, got {}",
                self.audio.frame_ms
            )));
        }
        Ok(())
    }
}

/// Load settings with layered precedence:
/// env vars (MARS__*) > config/{env}.yaml > config/settings.yaml > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/settings").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("MARS")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

fn default_assistant_name() -> String {
    "MARS".to_string()
}
fn default_wake_word() -> String {
    "hey mars".to_string()
}
fn default_owner() -> String {
    "there".to_string()
}
fn default_sample_rate() -> u32 {
    audio::SAMPLE_RATE
}
fn default_frame_ms() -> u32 {
    audio::FRAME_MS
}
fn default_silence_floor_db() -> f32 {
    audio::SILENCE_FLOOR_DB
}
fn default_backoff_initial_ms() -> u64 {
    backoff::INITIAL_MS
}
fn default_backoff_max_ms() -> u64 {
    backoff::MAX_MS
}
fn default_backoff_attempts() -> u32 {
    backoff::MAX_ATTEMPTS
}
fn default_wake_window_ms() -> u32 {
    wake::WINDOW_MS
}
fn default_wake_cooldown_ms() -> u32 {
    wake::COOLDOWN_MS
}
fn default_wake_threshold() -> f32 {
    wake::ACOUSTIC_THRESHOLD
}
fn default_endpoint_silence_ms() -> u32 {
    segmentation::ENDPOINT_SILENCE_MS
}
fn default_max_utterance_ms() -> u32 {
    segmentation::MAX_UTTERANCE_MS
}
fn default_verification_threshold() -> f32 {
    verification::THRESHOLD
}
fn default_profile_path() -> String {
    "voice_profiles/owner.json".to_string()
}
fn default_lockout_ms() -> u64 {
    60_000
}
fn default_stt_url() -> String {
    endpoints::STT_DEFAULT.to_string()
}
fn default_whisper_model() -> String {
    "base".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_stt_timeout_ms() -> u64 {
    timeouts::STT_TIMEOUT_MS
}
fn default_tts_url() -> String {
    endpoints::TTS_DEFAULT.to_string()
}
fn default_tts_timeout_ms() -> u64 {
    timeouts::TTS_TIMEOUT_MS
}
fn default_skill_timeout_ms() -> u64 {
    timeouts::SKILL_TIMEOUT_MS
}
fn default_weather_url() -> String {
    endpoints::WEATHER_DEFAULT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.assistant.wake_word, "hey mars");
        assert_eq!(settings.verification.threshold, 0.75);
        assert!(!settings.verification.enabled);
        assert_eq!(settings.segmentation.endpoint_silence_ms, 1_500);
        settings.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut settings = Settings::default();
        settings.verification.threshold = 1.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_segmentation() {
        let mut settings = Settings::default();
        settings.segmentation.max_utterance_ms = 1_000;
        assert!(settings.validate().is_err());
    }
}
