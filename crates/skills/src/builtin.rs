//! Built-in skills
//!
//! Three skills ship with the assistant, one per pattern kind: the clock
//! (exact triggers, purely local), weather (slotted template, HTTP glue),
//! and small talk (catch-all). Anything heavier belongs in an external
//! skill crate.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::time::Duration;

use crate::registry::{Skill, SkillResult};
use crate::router::SkillInvocation;
use crate::SkillError;

/// Tells the current time and date.
pub struct ClockSkill;

#[async_trait]
impl Skill for ClockSkill {
    fn id(&self) -> &str {
        "clock"
    }

    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError> {
        let now = chrono::Local::now();
        let text = if invocation.transcript.to_lowercase().contains("date")
            || invocation.transcript.to_lowercase().contains("day")
        {
            format!("Today is {}.", now.format("%A, %B %-d"))
        } else {
            format!("It's {}.", now.format("%-I:%M %p"))
        };
        Ok(SkillResult::text(text))
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    temperature_c: f32,
    condition: String,
}

/// Fetches current conditions for the extracted city. The base URL is
/// injectable so tests can point it at a local stub.
pub struct WeatherSkill {
    base_url: String,
    client: reqwest::Client,
}

impl WeatherSkill {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SkillError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .map_err(|e| SkillError::unavailable(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Skill for WeatherSkill {
    fn id(&self) -> &str {
        "weather"
    }

    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError> {
        let city = invocation
            .extracted_arguments
            .get("city")
            .ok_or_else(|| SkillError::invalid_argument("no city extracted"))?;

        let url = format!("{}/current", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("city", city.as_str())])
            .send()
            .await
            .map_err(|e| SkillError::unavailable(format!("weather service: {}", e)))?;

        if !response.status().is_success() {
            return Err(SkillError::upstream(format!(
                "weather service returned {}",
                response.status()
            )));
        }

        let weather: WeatherResponse = response
            .json()
            .await
            .map_err(|e| SkillError::upstream(format!("malformed weather response: {}", e)))?;

        Ok(SkillResult {
            text: format!(
                "It's {:.0} degrees and {} in {}.",
                weather.temperature_c, weather.condition, city
            ),
            side_effects: vec![format!("weather lookup for {}", city)],
        })
    }
}

const SMALL_TALK_REPLIES: &[&str] = &[
    "I'm doing well, thanks for asking.",
    "All systems nominal here.",
    "Happy to chat. What else can I do for you?",
    "I'm here and listening.",
];

/// Catch-all conversational skill. Picks a canned reply; no NLU.
pub struct SmallTalkSkill;

#[async_trait]
impl Skill for SmallTalkSkill {
    fn id(&self) -> &str {
        "small-talk"
    }

    async fn execute(&self, _: &SkillInvocation) -> Result<SkillResult, SkillError> {
        let reply = SMALL_TALK_REPLIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(SMALL_TALK_REPLIES[0]);
        Ok(SkillResult::text(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn invocation(skill_id: &str, transcript: &str) -> SkillInvocation {
        SkillInvocation {
            id: Uuid::new_v4(),
            skill_id: skill_id.to_string(),
            extracted_arguments: HashMap::new(),
            transcript: transcript.to_string(),
        }
    }

    #[tokio::test]
    async fn test_clock_time_and_date() {
        let skill = ClockSkill;

        let time = skill
            .execute(&invocation("clock", "what time is it"))
            .await
            .unwrap();
        assert!(time.text.starts_with("It's"));

        let date = skill
            .execute(&invocation("clock", "what's the date today"))
            .await
            .unwrap();
        assert!(date.text.starts_with("Today is"));
    }

    #[tokio::test]
    async fn test_weather_requires_city() {
        let skill = WeatherSkill::new("http://127.0.0.1:1").unwrap();
        let err = skill
            .execute(&invocation("weather", "weather"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::SkillErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_small_talk_always_replies() {
        let skill = SmallTalkSkill;
        let result = skill
            .execute(&invocation("small-talk", "how are you"))
            .await
            .unwrap();
        assert!(!result.text.is_empty());
    }
}
