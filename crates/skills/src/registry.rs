//! Skill registry and execution
//!
//! Skills register under their id and run through [`SkillRegistry::execute`],
//! which wraps every invocation in the configured timeout so a hung skill
//! never blocks the listen loop.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::router::SkillInvocation;
use crate::SkillError;

/// What a skill produced for one invocation
#[derive(Debug, Clone)]
pub struct SkillResult {
    /// Text spoken back to the user
    pub text: String,
    /// Human-readable record of external actions the skill took
    pub side_effects: Vec<String>,
}

impl SkillResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            side_effects: Vec::new(),
        }
    }
}

/// The uniform skill contract. Concrete skills are thin glue over external
/// services; routing and timeout policy live outside them.
#[async_trait]
pub trait Skill: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError>;
}

/// Executes routed invocations against registered skills.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError>;
}

pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    timeout: Duration,
}

impl SkillRegistry {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            skills: HashMap::new(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn register<S: Skill + 'static>(&mut self, skill: S) {
        let id = skill.id().to_string();
        self.skills.insert(id, Arc::new(skill));
    }

    pub fn register_arc(&mut self, skill: Arc<dyn Skill>) {
        self.skills.insert(skill.id().to_string(), skill);
    }

    pub fn has(&self, skill_id: &str) -> bool {
        self.skills.contains_key(skill_id)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn skill_ids(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }
}

#[async_trait]
impl SkillExecutor for SkillRegistry {
    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError> {
        let skill = self.skills.get(&invocation.skill_id).ok_or_else(|| {
            SkillError::unavailable(format!("skill '{}' is not registered", invocation.skill_id))
        })?;

        let started = Instant::now();
        tracing::debug!(
            skill = %invocation.skill_id,
            invocation = %invocation.id,
            "Executing skill"
        );

        let result = tokio::time::timeout(self.timeout, skill.execute(invocation))
            .await
            .map_err(|_| {
                SkillError::timeout(&invocation.skill_id, self.timeout.as_millis() as u64)
            })??;

        tracing::info!(
            skill = %invocation.skill_id,
            duration_ms = started.elapsed().as_millis() as u64,
            side_effects = result.side_effects.len(),
            "Skill completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn invocation_for(skill_id: &str) -> SkillInvocation {
        SkillInvocation {
            id: Uuid::new_v4(),
            skill_id: skill_id.to_string(),
            extracted_arguments: HashMap::new(),
            transcript: String::new(),
        }
    }

    struct EchoSkill;

    #[async_trait]
    impl Skill for EchoSkill {
        fn id(&self) -> &str {
            "echo"
        }

        async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError> {
            Ok(SkillResult::text(invocation.transcript.clone()))
        }
    }

    struct SlowSkill;

    #[async_trait]
    impl Skill for SlowSkill {
        fn id(&self) -> &str {
            "slow"
        }

        async fn execute(&self, _: &SkillInvocation) -> Result<SkillResult, SkillError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SkillResult::text("too late"))
        }
    }

    #[tokio::test]
    async fn test_execute_registered_skill() {
        let mut registry = SkillRegistry::new(1_000);
        registry.register(EchoSkill);

        let mut invocation = invocation_for("echo");
        invocation.transcript = "hello".to_string();
        let result = registry.execute(&invocation).await.unwrap();
        assert_eq!(result.text, "hello");
    }

    #[tokio::test]
    async fn test_unknown_skill_is_unavailable() {
        let registry = SkillRegistry::new(1_000);
        let err = registry.execute(&invocation_for("missing")).await.unwrap_err();
        assert_eq!(err.kind, crate::SkillErrorKind::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_enforced() {
        let mut registry = SkillRegistry::new(50);
        registry.register(SlowSkill);

        let err = registry.execute(&invocation_for("slow")).await.unwrap_err();
        assert_eq!(err.kind, crate::SkillErrorKind::Timeout);
    }
}
