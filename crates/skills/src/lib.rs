//! Skill layer for MARS
//!
//! Transcripts are matched against registered patterns by [`SkillRouter`];
//! the winning [`SkillInvocation`] is executed through [`SkillRegistry`]
//! under a per-invocation timeout. Concrete skills are thin glue over the
//! uniform [`Skill`] contract; the router never sees their internals.

pub mod builtin;
pub mod pattern;
pub mod registry;
pub mod router;

pub use pattern::{MatchExpression, SkillPattern};
pub use registry::{Skill, SkillExecutor, SkillRegistry, SkillResult};
pub use router::{RouteOutcome, SkillInvocation, SkillRouter};

use thiserror::Error;

/// Failure categories a skill can report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillErrorKind {
    /// Execution exceeded the configured bound
    Timeout,
    /// The skill or its upstream service is not reachable
    Unavailable,
    /// The extracted arguments do not satisfy the skill's contract
    InvalidArgument,
    /// The upstream service answered with an error
    Upstream,
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SkillError {
    pub kind: SkillErrorKind,
    pub message: String,
}

impl SkillError {
    pub fn timeout(skill_id: &str, bound_ms: u64) -> Self {
        Self {
            kind: SkillErrorKind::Timeout,
            message: format!("skill '{}' exceeded {}ms", skill_id, bound_ms),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SkillErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: SkillErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: SkillErrorKind::Upstream,
            message: message.into(),
        }
    }
}
