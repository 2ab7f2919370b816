//! End-to-end orchestrator scenarios driven by scripted audio, stub
//! transcribers, and in-memory skills.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use mars_config::{SegmentationConfig, VerificationConfig};
use mars_core::{AudioFrame, Channels, SampleRate, TranscriptionResult, Utterance, VoiceProfile};
use mars_pipeline::device::{
    CaptureConfig, CaptureStream, NullSink, ReopenPolicy, SourceFactory, WavSource,
};
use mars_pipeline::spectral::FeatureExtractor;
use mars_pipeline::stt::Transcriber;
use mars_pipeline::tts::{ResponseSynthesizer, SynthesisEngine, SynthesizedAudio};
use mars_pipeline::verify::{embed_samples, SpeakerVerifier};
use mars_pipeline::wake::{KeywordSpotter, WakeWordDetector};
use mars_pipeline::PipelineError;
use mars_session::{ConversationOrchestrator, OrchestratorConfig, Phrases, SessionEvent, SessionState};
use mars_skills::{
    MatchExpression, Skill, SkillError, SkillInvocation, SkillPattern, SkillRegistry, SkillResult,
    SkillRouter,
};

const FRAME_LEN: usize = 320;

// ---- stubs ----------------------------------------------------------------

struct FixedTranscriber(Option<&'static str>);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _: &Utterance) -> Result<TranscriptionResult, PipelineError> {
        match self.0 {
            Some(text) => Ok(TranscriptionResult {
                text: text.to_string(),
                confidence: 0.9,
                language: Some("en".to_string()),
            }),
            None => Err(PipelineError::Transcription("decode failed".to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

struct StubEngine {
    fail: bool,
    samples: usize,
}

#[async_trait]
impl SynthesisEngine for StubEngine {
    async fn synthesize(&self, _: &str) -> Result<SynthesizedAudio, PipelineError> {
        if self.fail {
            return Err(PipelineError::Synthesis("engine down".to_string()));
        }
        Ok(SynthesizedAudio {
            samples: vec![0.1; self.samples],
            sample_rate: SampleRate::Hz16000,
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct RecordingSkill {
    id: &'static str,
    reply: &'static str,
    seen: Arc<Mutex<Option<SkillInvocation>>>,
}

#[async_trait]
impl Skill for RecordingSkill {
    fn id(&self) -> &str {
        self.id
    }

    async fn execute(&self, invocation: &SkillInvocation) -> Result<SkillResult, SkillError> {
        *self.seen.lock() = Some(invocation.clone());
        Ok(SkillResult::text(self.reply))
    }
}

struct HangingSkill;

#[async_trait]
impl Skill for HangingSkill {
    fn id(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _: &SkillInvocation) -> Result<SkillResult, SkillError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(SkillResult::text("too late"))
    }
}

// ---- builders -------------------------------------------------------------

struct Harness {
    orchestrator: Arc<ConversationOrchestrator>,
    sink: Arc<NullSink>,
    seen: Arc<Mutex<Option<SkillInvocation>>>,
}

struct HarnessOptions {
    transcript: Option<&'static str>,
    verification: VerificationConfig,
    verifier: Option<SpeakerVerifier>,
    primary_fails: bool,
    fallback_fails: bool,
    playback_samples: usize,
    skill_timeout_ms: u64,
    phrases: Phrases,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            transcript: Some("what's the weather in london"),
            verification: VerificationConfig::default(),
            verifier: None,
            primary_fails: false,
            fallback_fails: false,
            playback_samples: 1600,
            skill_timeout_ms: 200,
            phrases: Phrases::default(),
        }
    }
}

fn build(options: HarnessOptions) -> Harness {
    let detector = WakeWordDetector::new(
        Box::new(KeywordSpotter::new("hey mars", 2000, 20, -45.0)),
        Duration::from_secs(2),
    );

    let mut router = SkillRouter::new(None);
    router
        .register(SkillPattern::new(
            "weather",
            MatchExpression::template("weather in {city}").unwrap(),
            0,
        ))
        .unwrap();
    router
        .register(SkillPattern::new(
            "clock",
            MatchExpression::exact("what time is it"),
            0,
        ))
        .unwrap();
    router
        .register(SkillPattern::new("slow", MatchExpression::exact("take your time"), 0))
        .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let mut registry = SkillRegistry::new(options.skill_timeout_ms);
    registry.register(RecordingSkill {
        id: "weather",
        reply: "It's 12 degrees and cloudy in london.",
        seen: seen.clone(),
    });
    registry.register(RecordingSkill {
        id: "clock",
        reply: "It's noon.",
        seen: seen.clone(),
    });
    registry.register(HangingSkill);

    let sink = Arc::new(NullSink::new());
    let synthesizer = ResponseSynthesizer::new(
        Box::new(StubEngine {
            fail: options.primary_fails,
            samples: options.playback_samples,
        }),
        Box::new(StubEngine {
            fail: options.fallback_fails,
            samples: options.playback_samples,
        }),
        sink.clone(),
    );

    let config = OrchestratorConfig {
        verification: options.verification,
        segmentation: SegmentationConfig {
            endpoint_silence_ms: 200,
            max_utterance_ms: 1000,
        },
        silence_floor_db: -45.0,
        phrases: options.phrases,
    };

    let orchestrator = Arc::new(ConversationOrchestrator::new(
        config,
        detector,
        options.verifier,
        Arc::new(FixedTranscriber(options.transcript)),
        router,
        Arc::new(registry),
        synthesizer,
    ));

    Harness {
        orchestrator,
        sink,
        seen,
    }
}

fn voiced_utterance() -> Utterance {
    let mut utterance = Utterance::new(SampleRate::Hz16000);
    for seq in 0..20 {
        let samples: Vec<f32> = (0..FRAME_LEN)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / 16000.0).sin() * 0.3)
            .collect();
        utterance.push(
            &AudioFrame::new(samples, SampleRate::Hz16000, Channels::Mono, seq),
            true,
        );
    }
    utterance
}

fn chirp_utterance() -> Utterance {
    let mut utterance = Utterance::new(SampleRate::Hz16000);
    for seq in 0..20u64 {
        let samples: Vec<f32> = (0..FRAME_LEN)
            .map(|i| {
                let t = (seq as usize * FRAME_LEN + i) as f32 / 16000.0;
                (2.0 * std::f32::consts::PI * (2500.0 + 1500.0 * t) * t).sin() * 0.3
            })
            .collect();
        utterance.push(
            &AudioFrame::new(samples, SampleRate::Hz16000, Channels::Mono, seq),
            true,
        );
    }
    utterance
}

/// Profile enrolled on a steady 180Hz voice-like tone
fn enrolled_profile() -> VoiceProfile {
    let samples: Vec<f32> = (0..16000)
        .map(|i| {
            let t = i as f32 / 16000.0;
            (2.0 * std::f32::consts::PI * 180.0 * t).sin() * 0.3
        })
        .collect();
    let extractor = FeatureExtractor::new(FRAME_LEN, 16);
    let embedding = embed_samples(&extractor, FRAME_LEN, &samples).unwrap();
    VoiceProfile::new("alex", embedding, 1)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn scripted_stream(samples: Vec<f32>) -> CaptureStream {
    let source = Box::new(WavSource::from_samples(samples, CaptureConfig::default()));
    let factory: SourceFactory =
        Box::new(|| Err(PipelineError::Device("no reopen in tests".to_string())));
    CaptureStream::new(source, factory, ReopenPolicy::default())
}

fn tone_frame(voiced: bool) -> Vec<f32> {
    if voiced {
        (0..FRAME_LEN)
            .map(|i| (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 16000.0).sin() * 0.3)
            .collect()
    } else {
        vec![0.0; FRAME_LEN]
    }
}

fn extend_frames(samples: &mut Vec<f32>, voiced: bool, count: usize) {
    for _ in 0..count {
        samples.extend(tone_frame(voiced));
    }
}

/// Silence plus two voiced bursts spelling the wake phrase, then silence
fn wake_audio(trailing_silence_frames: usize) -> Vec<f32> {
    let mut samples = Vec::new();
    extend_frames(&mut samples, false, 5);
    extend_frames(&mut samples, true, 10);
    extend_frames(&mut samples, false, 4);
    extend_frames(&mut samples, true, 10);
    extend_frames(&mut samples, false, trailing_silence_frames);
    samples
}

// ---- scenarios ------------------------------------------------------------

#[tokio::test]
async fn test_weather_end_to_end() {
    let harness = build(HarnessOptions::default());
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let invocation = harness.seen.lock().clone().unwrap();
    assert_eq!(invocation.skill_id, "weather");
    assert_eq!(
        invocation.extracted_arguments.get("city").map(String::as_str),
        Some("london")
    );

    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if text.contains("12 degrees"))
    ));
}

#[tokio::test]
async fn test_false_trigger_skips_verification_and_transcription() {
    let mut options = HarnessOptions::default();
    options.verification.enabled = true;
    options.verifier = Some(SpeakerVerifier::new(enrolled_profile(), 0.75, FRAME_LEN, 16));
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    // Wake phrase then nothing but silence
    let mut stream = scripted_stream(wake_audio(40));
    harness.orchestrator.clone().run(&mut stream).await.unwrap();

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::WakeDetected { .. })));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::FalseTrigger)));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::VerificationOutcome { .. })));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::TranscriptReady { .. })));
    assert_eq!(harness.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_transcription_failure_speaks_apology() {
    let options = HarnessOptions {
        transcript: None,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.transcription_apology)
    ));
    assert!(harness.seen.lock().is_none());
}

#[tokio::test]
async fn test_empty_transcript_speaks_didnt_catch() {
    let options = HarnessOptions {
        transcript: Some("   "),
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.didnt_catch)
    ));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::TranscriptReady { .. })));
    assert!(harness.seen.lock().is_none());
}

#[tokio::test]
async fn test_no_match_speaks_canned_response() {
    let options = HarnessOptions {
        transcript: Some("open the pod bay doors"),
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.no_match)
    ));
}

#[tokio::test]
async fn test_skill_timeout_produces_timeout_phrase() {
    let options = HarnessOptions {
        transcript: Some("take your time"),
        skill_timeout_ms: 50,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    let started = std::time::Instant::now();
    harness.orchestrator.run_cycle(voiced_utterance()).await;
    // The cycle must not wait for the hung skill
    assert!(started.elapsed() < Duration::from_secs(5));

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.skill_timeout)
    ));
}

#[tokio::test]
async fn test_primary_synthesis_failure_is_transparent() {
    let options = HarnessOptions {
        primary_fails: true,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Fallback rendered and played; no synthesis error surfaced
    assert!(harness.sink.samples_played() > 0);
    let events = drain(&mut rx);
    assert!(!events.iter().any(
        |e| matches!(e, SessionEvent::CycleError { stage, .. } if *stage == "synthesis")
    ));
}

#[tokio::test]
async fn test_both_engines_failing_logs_not_drops() {
    let options = HarnessOptions {
        primary_fails: true,
        fallback_fails: true,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let events = drain(&mut rx);
    // The response text is still emitted even though nothing played
    assert!(events.iter().any(|e| matches!(e, SessionEvent::Response { .. })));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::CycleError { stage, .. } if *stage == "synthesis")
    ));
    assert_eq!(harness.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_rejection_without_guest_skills_denies_access() {
    let mut options = HarnessOptions::default();
    options.verification.enabled = true;
    options.verification.threshold = 0.999;
    options.verifier = Some(SpeakerVerifier::new(enrolled_profile(), 0.999, FRAME_LEN, 16));
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    // Chirp audio does not match the enrolled tone
    harness.orchestrator.run_cycle(chirp_utterance()).await;

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::VerificationOutcome { accepted: false, .. })
    ));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.access_denied)
    ));
    assert!(harness.seen.lock().is_none());
}

#[tokio::test]
async fn test_rejection_with_guest_skills_routes_restricted() {
    let mut options = HarnessOptions::default();
    options.transcript = Some("what time is it");
    options.verification.enabled = true;
    options.verification.threshold = 0.999;
    options.verification.guest_skills = vec!["clock".to_string()];
    options.verifier = Some(SpeakerVerifier::new(enrolled_profile(), 0.999, FRAME_LEN, 16));
    let harness = build(options);

    harness.orchestrator.run_cycle(chirp_utterance()).await;

    // Clock is on the guest list, so the rejected speaker still gets the time
    let invocation = harness.seen.lock().clone().unwrap();
    assert_eq!(invocation.skill_id, "clock");
}

#[tokio::test]
async fn test_rejection_with_guest_skills_blocks_privileged() {
    let mut options = HarnessOptions::default();
    options.transcript = Some("what's the weather in london");
    options.verification.enabled = true;
    options.verification.threshold = 0.999;
    options.verification.guest_skills = vec!["clock".to_string()];
    options.verifier = Some(SpeakerVerifier::new(enrolled_profile(), 0.999, FRAME_LEN, 16));
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(chirp_utterance()).await;

    assert!(harness.seen.lock().is_none());
    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.no_match)
    ));
}

#[tokio::test]
async fn test_repeated_rejections_trip_lockout() {
    let mut options = HarnessOptions::default();
    options.verification.enabled = true;
    options.verification.threshold = 0.999;
    options.verification.max_rejections = Some(2);
    options.verification.lockout_ms = 60_000;
    options.verifier = Some(SpeakerVerifier::new(enrolled_profile(), 0.999, FRAME_LEN, 16));
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(chirp_utterance()).await;
    harness.orchestrator.run_cycle(chirp_utterance()).await;

    let phrases = Phrases::default();
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::LockedOut)));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if *text == phrases.locked_out)
    ));
}

#[tokio::test]
async fn test_barge_in_cancels_playback() {
    let options = HarnessOptions {
        // 4 seconds of playback, plenty to interrupt
        playback_samples: 64_000,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;
    assert_eq!(harness.orchestrator.state(), SessionState::Responding);

    // Wake phrase arrives mid-playback
    let mut stream = scripted_stream(wake_audio(40));
    harness.orchestrator.clone().run(&mut stream).await.unwrap();

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, SessionEvent::BargeIn)));
    // Playback was cancelled well before its 4s duration
    assert!(harness.sink.samples_played() < 64_000);
}

#[tokio::test]
async fn test_verification_disabled_goes_straight_to_transcription() {
    let harness = build(HarnessOptions::default());
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::VerificationOutcome { .. })));
    assert!(events.iter().any(|e| matches!(e, SessionEvent::TranscriptReady { .. })));
}

// The frame loop must stay live while a skill runs; a spawned cycle keeps
// the current-thread runtime from exercising that, so this one is
// multi-threaded.
#[tokio::test(flavor = "multi_thread")]
async fn test_wake_during_skill_execution_interrupts_cycle() {
    let options = HarnessOptions {
        transcript: Some("take your time"),
        skill_timeout_ms: 30_000,
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    // Wake, a command that routes to the hung skill, enough silence to
    // clear the detector cooldown, then a second wake with nothing after
    let mut samples = wake_audio(1);
    extend_frames(&mut samples, true, 10);
    extend_frames(&mut samples, false, 10);
    extend_frames(&mut samples, false, 85);
    extend_frames(&mut samples, true, 10);
    extend_frames(&mut samples, false, 4);
    extend_frames(&mut samples, true, 10);
    extend_frames(&mut samples, false, 15);
    let mut stream = scripted_stream(samples);

    let started = std::time::Instant::now();
    harness.orchestrator.clone().run(&mut stream).await.unwrap();
    // The loop must not block on the 30s skill timeout
    assert!(started.elapsed() < Duration::from_secs(5));

    let events = drain(&mut rx);
    let wakes = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::WakeDetected { .. }))
        .count();
    assert_eq!(wakes, 2, "second wake must be heard while the skill runs");
    assert!(events.iter().any(|e| matches!(e, SessionEvent::BargeIn)));
    // The aborted cycle never produced a reply
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Response { .. })));
    assert_eq!(harness.orchestrator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_configured_phrase_table_is_used() {
    let options = HarnessOptions {
        transcript: Some("open the pod bay doors"),
        phrases: Phrases {
            no_match: "That one is beyond me.".to_string(),
            ..Phrases::default()
        },
        ..Default::default()
    };
    let harness = build(options);
    let mut rx = harness.orchestrator.subscribe();

    assert_eq!(
        harness.orchestrator.phrases().no_match,
        "That one is beyond me."
    );

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Response { text } if text == "That one is beyond me.")
    ));
}

#[tokio::test]
async fn test_state_transitions_are_broadcast() {
    let harness = build(HarnessOptions::default());
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.run_cycle(voiced_utterance()).await;

    let events = drain(&mut rx);
    let transitions: Vec<(SessionState, SessionState)> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert!(transitions.contains(&(SessionState::Idle, SessionState::Transcribing)));
    assert!(transitions.contains(&(SessionState::Transcribing, SessionState::Routing)));
    assert!(transitions.contains(&(SessionState::Routing, SessionState::Executing)));
    assert!(transitions.contains(&(SessionState::Executing, SessionState::Responding)));
}
