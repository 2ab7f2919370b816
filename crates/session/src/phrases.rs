//! Canned user-facing phrases
//!
//! Every per-cycle failure maps to a fixed spoken response, so nothing ever
//! fails silently. Kept in one table to make the assistant's voice easy to
//! review and retune.

#[derive(Debug, Clone)]
pub struct Phrases {
    /// Transcription produced nothing usable
    pub didnt_catch: String,
    /// Verification rejected and no guest skills are configured
    pub access_denied: String,
    /// Transcription backend failed outright
    pub transcription_apology: String,
    /// Skill exceeded its execution bound
    pub skill_timeout: String,
    /// Skill failed for any other reason
    pub skill_error: String,
    /// No pattern matched and no catch-all is configured
    pub no_match: String,
    /// Repeated rejections tripped the lockout policy
    pub locked_out: String,
    /// Spoken on graceful shutdown
    pub farewell: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            didnt_catch: "Sorry, I didn't catch that.".to_string(),
            access_denied: "Sorry, I don't recognize your voice.".to_string(),
            transcription_apology: "Sorry, I couldn't understand that.".to_string(),
            skill_timeout: "That skill isn't responding right now.".to_string(),
            skill_error: "Something went wrong with that request.".to_string(),
            no_match: "I'm not sure how to help with that.".to_string(),
            locked_out: "Too many failed attempts. I'll stop listening for a while.".to_string(),
            farewell: "Goodbye.".to_string(),
        }
    }
}

impl Phrases {
    /// Startup greeting naming the owner and the wake phrase
    pub fn greeting(&self, owner: &str, wake_word: &str) -> String {
        format!("Hello {}. Say \"{}\" when you need me.", owner, wake_word)
    }
}
