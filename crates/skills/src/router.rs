//! Transcript-to-skill routing
//!
//! Every registered pattern is tried against the normalized transcript. Among
//! the candidates the winner is picked by highest priority, then longest
//! matched span, then earliest registration order, so routing is
//! deterministic for any pattern set. The catch-all skill only receives
//! transcripts no pattern matched.

use std::collections::HashMap;
use uuid::Uuid;

use crate::pattern::{normalize, SkillPattern};
use crate::SkillError;

/// A routed request, consumed once by the executor
#[derive(Debug, Clone)]
pub struct SkillInvocation {
    pub id: Uuid,
    pub skill_id: String,
    pub extracted_arguments: HashMap<String, String>,
    /// The raw transcript, for skills that want the full phrasing
    pub transcript: String,
}

/// Result of routing one transcript
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    Matched(SkillInvocation),
    NoMatch,
}

struct Registered {
    pattern: SkillPattern,
    order: usize,
}

/// Pattern table plus optional catch-all. Patterns are registered at startup
/// and immutable for the session.
pub struct SkillRouter {
    patterns: Vec<Registered>,
    catch_all: Option<String>,
}

impl SkillRouter {
    pub fn new(catch_all: Option<String>) -> Self {
        Self {
            patterns: Vec::new(),
            catch_all,
        }
    }

    /// Register a pattern. Two patterns with identical expression and
    /// priority would make the tie-break ambiguous and are rejected.
    pub fn register(&mut self, pattern: SkillPattern) -> Result<(), SkillError> {
        let duplicate = self.patterns.iter().any(|r| {
            r.pattern.expression.source() == pattern.expression.source()
                && r.pattern.priority == pattern.priority
        });
        if duplicate {
            return Err(SkillError::invalid_argument(format!(
                "pattern '{}' at priority {} is already registered",
                pattern.expression.source(),
                pattern.priority
            )));
        }

        tracing::debug!(
            skill = %pattern.skill_id,
            pattern = pattern.expression.source(),
            priority = pattern.priority,
            "Skill pattern registered"
        );
        self.patterns.push(Registered {
            pattern,
            order: self.patterns.len(),
        });
        Ok(())
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Route a transcript to the best-matching skill.
    pub fn route(&self, transcript: &str) -> RouteOutcome {
        self.route_filtered(transcript, None)
    }

    /// Route with an optional allow-list of skill ids (guest mode). The
    /// catch-all is subject to the same list.
    pub fn route_filtered(&self, transcript: &str, allowed: Option<&[String]>) -> RouteOutcome {
        let normalized = normalize(transcript);

        let permitted = |skill_id: &str| match allowed {
            Some(list) => list.iter().any(|s| s == skill_id),
            None => true,
        };

        // (priority, span, registration order); order ascends, the rest descend
        let mut best: Option<(i32, usize, usize, SkillInvocation)> = None;
        for registered in &self.patterns {
            if !permitted(&registered.pattern.skill_id) {
                continue;
            }
            let Some(outcome) = registered.pattern.expression.matches(&normalized) else {
                continue;
            };

            let candidate = (
                registered.pattern.priority,
                outcome.span,
                registered.order,
                SkillInvocation {
                    id: Uuid::new_v4(),
                    skill_id: registered.pattern.skill_id.clone(),
                    extracted_arguments: outcome.arguments,
                    transcript: transcript.to_string(),
                },
            );

            let wins = match &best {
                None => true,
                Some((priority, span, order, _)) => {
                    (candidate.0, candidate.1) > (*priority, *span)
                        || (candidate.0, candidate.1) == (*priority, *span)
                            && candidate.2 < *order
                },
            };
            if wins {
                best = Some(candidate);
            }
        }

        if let Some((priority, span, _, invocation)) = best {
            tracing::info!(
                skill = %invocation.skill_id,
                priority,
                span,
                "Transcript routed"
            );
            return RouteOutcome::Matched(invocation);
        }

        if let Some(catch_all) = &self.catch_all {
            if permitted(catch_all) {
                tracing::debug!(skill = %catch_all, "No pattern matched, using catch-all");
                return RouteOutcome::Matched(SkillInvocation {
                    id: Uuid::new_v4(),
                    skill_id: catch_all.clone(),
                    extracted_arguments: HashMap::new(),
                    transcript: transcript.to_string(),
                });
            }
        }
        RouteOutcome::NoMatch
    }
}
