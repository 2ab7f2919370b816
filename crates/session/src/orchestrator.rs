//! Conversation state machine
//!
//! One orchestrator instance owns the session. The frame loop feeds the wake
//! detector continuously; a detection starts a capture cycle whose
//! verification, transcription, routing, and execution run on a spawned task
//! so the microphone stays live. A new wake trigger aborts the in-flight
//! cycle and cancels active playback before the next capture. Every
//! transition and failure is broadcast as a [`SessionEvent`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use mars_config::{SegmentationConfig, VerificationConfig};
use mars_core::Utterance;
use mars_pipeline::device::CaptureStream;
use mars_pipeline::segment::{SegmentProgress, UtteranceCollector};
use mars_pipeline::stt::Transcriber;
use mars_pipeline::tts::{PlaybackHandle, ResponseSynthesizer};
use mars_pipeline::verify::SpeakerVerifier;
use mars_pipeline::wake::WakeWordDetector;
use mars_pipeline::PipelineError;
use mars_skills::{RouteOutcome, SkillErrorKind, SkillExecutor, SkillRouter};

use crate::phrases::Phrases;
use crate::SessionError;

/// Orchestrator phase. Exactly one instance of this state exists per
/// process; only the orchestrator mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Verifying,
    Transcribing,
    Routing,
    Executing,
    Responding,
}

/// Broadcast on every transition and notable outcome
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    WakeDetected { score: f32 },
    /// Wake trigger with zero voiced frames afterwards
    FalseTrigger,
    VerificationOutcome { accepted: bool, score: f32 },
    TranscriptReady { text: String },
    SkillInvoked { skill_id: String },
    Response { text: String },
    BargeIn,
    LockedOut,
    CycleError { stage: &'static str, message: String },
}

/// Session-level policy the orchestrator needs beyond its components
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub verification: VerificationConfig,
    pub segmentation: SegmentationConfig,
    pub silence_floor_db: f32,
    pub phrases: Phrases,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            verification: VerificationConfig::default(),
            segmentation: SegmentationConfig::default(),
            silence_floor_db: mars_config::constants::audio::SILENCE_FLOOR_DB,
            phrases: Phrases::default(),
        }
    }
}

pub struct ConversationOrchestrator {
    config: OrchestratorConfig,
    detector: Mutex<WakeWordDetector>,
    verifier: Option<SpeakerVerifier>,
    transcriber: Arc<dyn Transcriber>,
    router: SkillRouter,
    executor: Arc<dyn SkillExecutor>,
    synthesizer: ResponseSynthesizer,
    state: Mutex<SessionState>,
    event_tx: broadcast::Sender<SessionEvent>,
    active_playback: Mutex<Option<PlaybackHandle>>,
    active_cycle: Mutex<Option<JoinHandle<String>>>,
    consecutive_rejections: Mutex<u32>,
    locked_until: Mutex<Option<Instant>>,
}

impl ConversationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        detector: WakeWordDetector,
        verifier: Option<SpeakerVerifier>,
        transcriber: Arc<dyn Transcriber>,
        router: SkillRouter,
        executor: Arc<dyn SkillExecutor>,
        synthesizer: ResponseSynthesizer,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            detector: Mutex::new(detector),
            verifier,
            transcriber,
            router,
            executor,
            synthesizer,
            state: Mutex::new(SessionState::Idle),
            event_tx,
            active_playback: Mutex::new(None),
            active_cycle: Mutex::new(None),
            consecutive_rejections: Mutex::new(0),
            locked_until: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The configured phrase table, for announcements built outside the
    /// cycle machinery.
    pub fn phrases(&self) -> &Phrases {
        &self.config.phrases
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn set_state(&self, to: SessionState) {
        let mut state = self.state.lock();
        let from = *state;
        if from == to {
            return;
        }
        *state = to;
        drop(state);
        tracing::debug!(?from, ?to, "Session state changed");
        self.emit(SessionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    /// Drive the session from a capture stream until it ends.
    ///
    /// Returns `Ok` when the stream closes cleanly (file replay exhausted,
    /// shutdown); device failures that survive the reopen policy are fatal.
    pub async fn run(self: Arc<Self>, stream: &mut CaptureStream) -> Result<(), SessionError> {
        tracing::info!("Session started");
        loop {
            let frame = match stream.next_frame().await {
                Ok(frame) => frame,
                Err(PipelineError::StreamClosed) => {
                    tracing::info!("Audio stream ended");
                    self.drain_cycle().await;
                    return Ok(());
                },
                Err(e) => return Err(e.into()),
            };

            // Cycle and playback completion are observed here rather than
            // from watcher tasks; the frame cadence bounds the latency.
            self.finish_completed_cycle().await;
            if self.state() == SessionState::Responding && self.playback_finished() {
                self.active_playback.lock().take();
                self.set_state(SessionState::Idle);
            }

            let detection = match self.detector.lock().feed(&frame) {
                Ok(detection) => detection,
                Err(e) => {
                    tracing::warn!(error = %e, "Wake detection error");
                    self.emit(SessionEvent::CycleError {
                        stage: "detection",
                        message: e.to_string(),
                    });
                    None
                },
            };
            let Some(event) = detection else { continue };

            if self.is_locked_out() {
                tracing::debug!("Wake trigger ignored during lockout");
                continue;
            }
            self.emit(SessionEvent::WakeDetected { score: event.score });

            self.barge_in().await;

            self.set_state(SessionState::Listening);
            match self.capture_utterance(stream).await? {
                Some(utterance) => {
                    let this = Arc::clone(&self);
                    let cycle =
                        tokio::spawn(async move { this.decide_reply(utterance).await });
                    *self.active_cycle.lock() = Some(cycle);
                },
                None => {
                    self.emit(SessionEvent::FalseTrigger);
                    self.set_state(SessionState::Idle);
                },
            }
            self.detector.lock().reset();
        }
    }

    /// Speak the reply of a cycle whose task has run to completion.
    async fn finish_completed_cycle(&self) {
        let finished = {
            let mut cycle = self.active_cycle.lock();
            match cycle.as_ref() {
                Some(handle) if handle.is_finished() => cycle.take(),
                _ => None,
            }
        };
        let Some(handle) = finished else { return };
        match handle.await {
            Ok(reply) => self.respond(&reply).await,
            Err(e) if e.is_cancelled() => {},
            Err(e) => {
                tracing::error!(error = %e, "Reply cycle task failed");
                self.emit(SessionEvent::CycleError {
                    stage: "cycle",
                    message: e.to_string(),
                });
                self.set_state(SessionState::Idle);
            },
        }
    }

    /// Let an in-flight cycle finish and speak its reply before the stream
    /// goes away. No-op when nothing is in flight.
    async fn drain_cycle(&self) {
        let pending = self.active_cycle.lock().take();
        let Some(handle) = pending else { return };
        match handle.await {
            Ok(reply) => self.respond(&reply).await,
            Err(e) => {
                tracing::error!(error = %e, "Reply cycle task failed");
                self.set_state(SessionState::Idle);
            },
        }
    }

    fn playback_finished(&self) -> bool {
        self.active_playback
            .lock()
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    fn is_locked_out(&self) -> bool {
        let mut locked = self.locked_until.lock();
        match *locked {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *locked = None;
                *self.consecutive_rejections.lock() = 0;
                tracing::info!("Lockout expired");
                false
            },
            None => false,
        }
    }

    /// Cancel the in-flight cycle and playback before a new listen cycle.
    /// Cancellation is observed (awaited) before this returns.
    async fn barge_in(&self) {
        let mut interrupted = false;

        let cycle = self.active_cycle.lock().take();
        if let Some(handle) = cycle {
            if handle.is_finished() {
                // The reply arrived but the user has already moved on
                let _ = handle.await;
            } else {
                tracing::info!("Barge-in, aborting in-flight cycle");
                handle.abort();
                let _ = handle.await;
                interrupted = true;
            }
        }

        let playback = self.active_playback.lock().take();
        if let Some(handle) = playback {
            if !handle.is_finished() {
                tracing::info!("Barge-in, cancelling active playback");
                handle.cancel();
                handle.wait().await;
                interrupted = true;
            }
        }

        if interrupted {
            self.emit(SessionEvent::BargeIn);
        }
    }

    /// Collect frames into an utterance until endpoint or ceiling.
    /// `None` marks a false trigger (no voiced frames).
    async fn capture_utterance(
        &self,
        stream: &mut CaptureStream,
    ) -> Result<Option<Utterance>, SessionError> {
        let sample_rate = stream.config().sample_rate;
        let mut collector = UtteranceCollector::new(
            sample_rate,
            &self.config.segmentation,
            self.config.silence_floor_db,
        );

        loop {
            let frame = match stream.next_frame().await {
                Ok(frame) => frame,
                // Stream ending mid-capture finalizes what we have
                Err(PipelineError::StreamClosed) => break,
                Err(e) => return Err(e.into()),
            };
            match collector.push(&frame) {
                SegmentProgress::Collecting => {},
                SegmentProgress::Endpointed | SegmentProgress::MaxDurationReached => break,
            }
        }
        Ok(collector.finish())
    }

    /// One full cycle from captured utterance to spoken response. Never
    /// fails; every error path maps to a phrase.
    pub async fn run_cycle(&self, utterance: Utterance) {
        let reply = self.decide_reply(utterance).await;
        self.respond(&reply).await;
    }

    async fn decide_reply(&self, utterance: Utterance) -> String {
        let phrases = &self.config.phrases;

        // Verification is skippable entirely; a rejection is a negative
        // result, not an error.
        let mut guest_filter: Option<Vec<String>> = None;
        if self.config.verification.enabled {
            if let Some(verifier) = &self.verifier {
                self.set_state(SessionState::Verifying);
                match verifier.verify(&utterance) {
                    Ok(result) => {
                        self.emit(SessionEvent::VerificationOutcome {
                            accepted: result.accepted,
                            score: result.score,
                        });
                        if result.accepted {
                            *self.consecutive_rejections.lock() = 0;
                        } else {
                            if let Some(reply) = self.note_rejection() {
                                return reply;
                            }
                            if self.config.verification.guest_skills.is_empty() {
                                return phrases.access_denied.clone();
                            }
                            guest_filter =
                                Some(self.config.verification.guest_skills.clone());
                        }
                    },
                    Err(e) => {
                        // Verifier faults fail open so the owner is not
                        // locked out by a broken embedding path
                        tracing::warn!(error = %e, "Verification error, proceeding");
                        self.emit(SessionEvent::CycleError {
                            stage: "verification",
                            message: e.to_string(),
                        });
                    },
                }
            }
        }

        self.set_state(SessionState::Transcribing);
        let transcript = match self.transcriber.transcribe(&utterance).await {
            Ok(result) if result.is_empty() => {
                tracing::info!("Transcription returned no usable text");
                return phrases.didnt_catch.clone();
            },
            Ok(result) => {
                self.emit(SessionEvent::TranscriptReady {
                    text: result.text.clone(),
                });
                result.text
            },
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed");
                self.emit(SessionEvent::CycleError {
                    stage: "transcription",
                    message: e.to_string(),
                });
                return phrases.transcription_apology.clone();
            },
        };

        self.set_state(SessionState::Routing);
        let invocation = match self
            .router
            .route_filtered(&transcript, guest_filter.as_deref())
        {
            RouteOutcome::Matched(invocation) => invocation,
            RouteOutcome::NoMatch => {
                tracing::info!(%transcript, "No skill matched");
                return phrases.no_match.clone();
            },
        };

        self.set_state(SessionState::Executing);
        self.emit(SessionEvent::SkillInvoked {
            skill_id: invocation.skill_id.clone(),
        });
        match self.executor.execute(&invocation).await {
            Ok(result) => result.text,
            Err(e) => {
                tracing::warn!(
                    skill = %invocation.skill_id,
                    error = %e,
                    "Skill execution failed"
                );
                self.emit(SessionEvent::CycleError {
                    stage: "execution",
                    message: e.to_string(),
                });
                match e.kind {
                    SkillErrorKind::Timeout => phrases.skill_timeout.clone(),
                    _ => phrases.skill_error.clone(),
                }
            },
        }
    }

    /// Track a rejection against the lockout policy. Returns the lockout
    /// phrase when the policy trips.
    fn note_rejection(&self) -> Option<String> {
        let max = self.config.verification.max_rejections?;
        let mut count = self.consecutive_rejections.lock();
        *count += 1;
        if *count < max {
            return None;
        }
        let until = Instant::now() + Duration::from_millis(self.config.verification.lockout_ms);
        *self.locked_until.lock() = Some(until);
        tracing::warn!(
            rejections = *count,
            lockout_ms = self.config.verification.lockout_ms,
            "Repeated rejections, locking out"
        );
        self.emit(SessionEvent::LockedOut);
        Some(self.config.phrases.locked_out.clone())
    }

    async fn respond(&self, text: &str) {
        self.set_state(SessionState::Responding);
        self.emit(SessionEvent::Response {
            text: text.to_string(),
        });
        match self.synthesizer.speak(text).await {
            Ok(handle) => {
                *self.active_playback.lock() = Some(handle);
            },
            Err(e) => {
                // Last resort: the response is logged, never dropped silently
                tracing::error!(error = %e, response = text, "Synthesis failed, text-only response");
                self.emit(SessionEvent::CycleError {
                    stage: "synthesis",
                    message: e.to_string(),
                });
                self.set_state(SessionState::Idle);
            },
        }
    }

    /// Speak a line outside the cycle machinery (greeting, farewell) and
    /// wait for it to finish.
    pub async fn announce(&self, text: &str) {
        match self.synthesizer.speak(text).await {
            Ok(handle) => handle.wait().await,
            Err(e) => tracing::error!(error = %e, text, "Announcement synthesis failed"),
        }
    }

    /// Cancel any active playback and speak the farewell.
    pub async fn shutdown(&self) {
        self.barge_in().await;
        let farewell = self.config.phrases.farewell.clone();
        self.announce(&farewell).await;
        tracing::info!("Session ended");
    }
}
