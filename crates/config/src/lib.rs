//! Configuration management for the MARS assistant
//!
//! Supports loading configuration from:
//! - YAML files (config/settings.yaml, config/{env}.yaml)
//! - Environment variables (MARS_ prefix, __ separator)
//! - Built-in defaults

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AssistantConfig, AudioConfig, SegmentationConfig, Settings, SkillsConfig,
    SttConfig, TtsConfig, TtsEngineKind, VerificationConfig, WakeConfig, WakeEngineKind,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
