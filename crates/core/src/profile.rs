//! Enrolled voice profile
//!
//! The profile is produced by the external enrollment tool and is read-only
//! at runtime. Exactly one active profile exists per configured owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Current on-disk format version
const PROFILE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("voice profile not found at {0}")]
    Missing(String),

    #[error("failed to read voice profile: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed voice profile: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("voice profile version {found} is not supported (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("voice profile embedding is empty")]
    EmptyEmbedding,

    #[error("voice profile owner mismatch: enrolled for '{enrolled}', configured owner is '{configured}'")]
    OwnerMismatch { enrolled: String, configured: String },
}

/// A persisted speaker embedding plus enrollment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Format version
    pub version: u32,
    /// Owner this profile was enrolled for
    pub owner_id: String,
    /// Speaker embedding vector
    pub embedding: Vec<f32>,
    /// When enrollment ran
    pub enrollment_date: DateTime<Utc>,
    /// Number of audio samples the embedding was averaged over
    pub sample_count: u32,
}

impl VoiceProfile {
    pub fn new(owner_id: impl Into<String>, embedding: Vec<f32>, sample_count: u32) -> Self {
        Self {
            version: PROFILE_VERSION,
            owner_id: owner_id.into(),
            embedding,
            enrollment_date: Utc::now(),
            sample_count,
        }
    }

    /// Load the profile for `owner_id` from a JSON file.
    ///
    /// Fails if the file is absent, malformed, or enrolled for someone else.
    pub fn load(path: impl AsRef<Path>, owner_id: &str) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ProfileError::Missing(path.display().to_string()));
        }

        let data = std::fs::read_to_string(path)?;
        let profile: VoiceProfile = serde_json::from_str(&data)?;

        if profile.version != PROFILE_VERSION {
            return Err(ProfileError::Version {
                found: profile.version,
                expected: PROFILE_VERSION,
            });
        }
        if profile.embedding.is_empty() {
            return Err(ProfileError::EmptyEmbedding);
        }
        if profile.owner_id != owner_id {
            return Err(ProfileError::OwnerMismatch {
                enrolled: profile.owner_id,
                configured: owner_id.to_string(),
            });
        }

        tracing::info!(
            owner = %profile.owner_id,
            dims = profile.embedding.len(),
            samples = profile.sample_count,
            "Voice profile loaded"
        );
        Ok(profile)
    }

    /// Persist to a JSON file. Used by the enrollment flow only.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner.json");

        let profile = VoiceProfile::new("alex", vec![0.1, 0.2, 0.3], 5);
        profile.save(&path).unwrap();

        let loaded = VoiceProfile::load(&path, "alex").unwrap();
        assert_eq!(loaded.owner_id, "alex");
        assert_eq!(loaded.embedding.len(), 3);
        assert_eq!(loaded.sample_count, 5);
    }

    #[test]
    fn test_profile_missing() {
        let err = VoiceProfile::load("/nonexistent/profile.json", "alex").unwrap_err();
        assert!(matches!(err, ProfileError::Missing(_)));
    }

    #[test]
    fn test_profile_owner_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owner.json");

        VoiceProfile::new("alex", vec![0.5; 8], 3).save(&path).unwrap();

        let err = VoiceProfile::load(&path, "sam").unwrap_err();
        assert!(matches!(err, ProfileError::OwnerMismatch { .. }));
    }
}
