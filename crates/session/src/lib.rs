//! Conversation orchestration for MARS
//!
//! [`ConversationOrchestrator`] drives the listen, verify, transcribe, route,
//! respond loop as an explicit state machine. Per-cycle failures are mapped
//! to spoken phrases and the machine always returns to idle; only device and
//! initialization errors escape to the caller.

mod orchestrator;
mod phrases;

pub use orchestrator::{ConversationOrchestrator, OrchestratorConfig, SessionEvent, SessionState};
pub use phrases::Phrases;

use mars_pipeline::PipelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Unrecoverable pipeline failure (device gone, profile unreadable)
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
