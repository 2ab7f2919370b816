//! Skill match patterns
//!
//! Two pattern kinds cover explicit routing: exact trigger substrings and
//! slotted templates ("weather in {city}") whose slots become named capture
//! groups. The catch-all conversational skill is router configuration, not a
//! pattern. Matching always runs against the normalized transcript.

use regex::Regex;
use std::collections::HashMap;

use crate::SkillError;

/// Lower-case and strip punctuation, collapsing runs of whitespace
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What a successful match produced
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Length of the matched span in characters; longer means more specific
    pub span: usize,
    /// Slot name to extracted value
    pub arguments: HashMap<String, String>,
}

/// A compiled match expression
#[derive(Debug, Clone)]
pub enum MatchExpression {
    /// Matches when the transcript contains the trigger
    Exact { trigger: String },
    /// Slotted template matched against the whole transcript
    Template { raw: String, regex: Regex },
}

impl MatchExpression {
    pub fn exact(trigger: &str) -> Self {
        Self::Exact {
            trigger: normalize(trigger),
        }
    }

    /// Compile a template like "play {query} on spotify". Slot names must be
    /// valid identifiers; literal segments are matched verbatim (normalized).
    /// The template may match anywhere inside the transcript, so "what's the
    /// weather in london" satisfies "weather in {city}".
    pub fn template(raw: &str) -> Result<Self, SkillError> {
        let normalized = normalize_template(raw);
        let mut pattern = String::new();
        let mut rest = normalized.as_str();

        while let Some(open) = rest.find('{') {
            let close = rest[open..].find('}').ok_or_else(|| {
                SkillError::invalid_argument(format!("unclosed slot in template '{}'", raw))
            })? + open;
            let name = &rest[open + 1..close];
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(SkillError::invalid_argument(format!(
                    "bad slot name '{}' in template '{}'",
                    name, raw
                )));
            }
            pattern.push_str(&regex::escape(&rest[..open]));
            pattern.push_str(&format!("(?P<{}>.+?)", name));
            rest = &rest[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        // A trailing slot captures to the end of the transcript
        if normalized.ends_with('}') {
            pattern.push('$');
        }

        let regex = Regex::new(&pattern).map_err(|e| {
            SkillError::invalid_argument(format!("template '{}' failed to compile: {}", raw, e))
        })?;
        Ok(Self::Template {
            raw: normalized,
            regex,
        })
    }

    /// The source form, used for duplicate-registration detection
    pub fn source(&self) -> &str {
        match self {
            Self::Exact { trigger } => trigger,
            Self::Template { raw, .. } => raw,
        }
    }

    /// Match against an already-normalized transcript
    pub fn matches(&self, normalized: &str) -> Option<MatchOutcome> {
        match self {
            Self::Exact { trigger } => {
                if normalized.contains(trigger.as_str()) {
                    Some(MatchOutcome {
                        span: trigger.chars().count(),
                        arguments: HashMap::new(),
                    })
                } else {
                    None
                }
            },
            Self::Template { regex, .. } => {
                let captures = regex.captures(normalized)?;
                let full = captures.get(0)?;
                let mut arguments = HashMap::new();
                for name in regex.capture_names().flatten() {
                    if let Some(value) = captures.name(name) {
                        arguments.insert(name.to_string(), value.as_str().trim().to_string());
                    }
                }
                Some(MatchOutcome {
                    span: full.as_str().chars().count(),
                    arguments,
                })
            },
        }
    }
}

/// Normalize a template's literal parts without touching slot markers
fn normalize_template(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '{' || c == '}' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A registered pattern bound to a skill
#[derive(Debug, Clone)]
pub struct SkillPattern {
    pub skill_id: String,
    pub expression: MatchExpression,
    pub priority: i32,
}

impl SkillPattern {
    pub fn new(skill_id: impl Into<String>, expression: MatchExpression, priority: i32) -> Self {
        Self {
            skill_id: skill_id.into(),
            expression,
            priority,
        }
    }
}
