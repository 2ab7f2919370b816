//! MARS voice assistant entry point
//!
//! Loads configuration, wires the pipeline to the skill layer, greets the
//! owner, and drives the conversation loop until the audio source ends or
//! ctrl-c arrives.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mars_config::constants::wake::SPECTRAL_BANDS;
use mars_config::{load_settings, Settings, TtsEngineKind};
use mars_core::VoiceProfile;
use mars_pipeline::device::{
    AudioSink, AudioSource, CaptureConfig, CaptureStream, NullSink, ReopenPolicy, SourceFactory,
    WavSource,
};
use mars_pipeline::stt::HttpTranscriber;
use mars_pipeline::tts::{
    LocalSynthesisEngine, RemoteSynthesisEngine, ResponseSynthesizer, SynthesisEngine,
};
use mars_pipeline::verify::SpeakerVerifier;
use mars_pipeline::wake::{create_wake_engine, WakeWordDetector};
use mars_session::{ConversationOrchestrator, OrchestratorConfig, Phrases};
use mars_skills::builtin::{ClockSkill, SmallTalkSkill, WeatherSkill};
use mars_skills::{MatchExpression, SkillPattern, SkillRegistry, SkillRouter};

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("MARS_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet
            eprintln!("Warning: failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        wake_word = %settings.assistant.wake_word,
        "Starting MARS"
    );

    let mut stream = open_capture(&settings)?;
    let orchestrator = Arc::new(build_orchestrator(&settings)?);

    let greeting = orchestrator
        .phrases()
        .greeting(&settings.assistant.owner, &settings.assistant.wake_word);
    orchestrator.announce(&greeting).await;

    tokio::select! {
        result = orchestrator.clone().run(&mut stream) => {
            result.context("session loop failed")?;
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        },
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mars_pipeline=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_capture(settings: &Settings) -> Result<CaptureStream> {
    let Some(path) = settings.audio.input_wav.clone() else {
        bail!("no audio input configured; set audio.input_wav (or MARS__AUDIO__INPUT_WAV)");
    };

    let sample_rate = mars_core::SampleRate::from_u32(settings.audio.sample_rate)
        .with_context(|| format!("unsupported sample rate {}", settings.audio.sample_rate))?;
    let config = CaptureConfig {
        sample_rate,
        channels: mars_core::Channels::Mono,
        frame_ms: settings.audio.frame_ms,
    };

    let source = WavSource::open(&path, config.clone())
        .with_context(|| format!("failed to open audio input {}", path))?;

    let factory_config = config.clone();
    let factory: SourceFactory = Box::new(move || {
        WavSource::open(&path, factory_config.clone()).map(|s| Box::new(s) as Box<dyn AudioSource>)
    });

    let policy = ReopenPolicy {
        initial_delay: Duration::from_millis(settings.audio.reopen_initial_ms),
        max_delay: Duration::from_millis(settings.audio.reopen_max_ms),
        max_attempts: settings.audio.reopen_max_attempts,
    };
    Ok(CaptureStream::new(Box::new(source), factory, policy))
}

fn build_orchestrator(settings: &Settings) -> Result<ConversationOrchestrator> {
    let sample_rate = mars_core::SampleRate::from_u32(settings.audio.sample_rate)
        .with_context(|| format!("unsupported sample rate {}", settings.audio.sample_rate))?;
    let frame_len = sample_rate.samples_for_ms(settings.audio.frame_ms);

    let engine = create_wake_engine(
        &settings.wake,
        &settings.assistant.wake_word,
        frame_len,
        settings.audio.frame_ms,
        settings.audio.silence_floor_db,
    );
    let detector = WakeWordDetector::new(
        engine,
        Duration::from_millis(settings.wake.cooldown_ms as u64),
    );

    // Verification is fatal to start without its profile
    let verifier = if settings.verification.enabled {
        let profile = VoiceProfile::load(
            &settings.verification.profile_path,
            &settings.assistant.owner,
        )
        .context("speaker verification is enabled but the voice profile could not be loaded")?;
        Some(SpeakerVerifier::new(
            profile,
            settings.verification.threshold,
            frame_len,
            SPECTRAL_BANDS,
        ))
    } else {
        tracing::info!("Speaker verification disabled, running unauthenticated");
        None
    };

    let transcriber = Arc::new(
        HttpTranscriber::new(settings.stt.clone()).context("failed to build transcriber")?,
    );

    let primary: Box<dyn SynthesisEngine> = match settings.tts.engine {
        TtsEngineKind::Remote => Box::new(
            RemoteSynthesisEngine::new(settings.tts.clone())
                .context("failed to build remote synthesis engine")?,
        ),
        TtsEngineKind::Local => Box::new(LocalSynthesisEngine::new()),
    };
    // No playback hardware abstraction yet; audio is metered and discarded
    let sink: Arc<dyn AudioSink> = Arc::new(NullSink::new());
    let synthesizer =
        ResponseSynthesizer::new(primary, Box::new(LocalSynthesisEngine::new()), sink);

    let mut router = SkillRouter::new(settings.skills.catch_all.clone());
    let mut registry = SkillRegistry::new(settings.skills.skill_timeout_ms);

    registry.register(ClockSkill);
    router
        .register(SkillPattern::new(
            "clock",
            MatchExpression::exact("what time is it"),
            0,
        ))
        .map_err(|e| anyhow::anyhow!(e))?;
    router
        .register(SkillPattern::new(
            "clock",
            MatchExpression::exact("what's the date"),
            0,
        ))
        .map_err(|e| anyhow::anyhow!(e))?;

    registry.register(
        WeatherSkill::new(settings.skills.weather_url.clone())
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    router
        .register(SkillPattern::new(
            "weather",
            MatchExpression::template("weather in {city}").map_err(|e| anyhow::anyhow!(e))?,
            0,
        ))
        .map_err(|e| anyhow::anyhow!(e))?;

    registry.register(SmallTalkSkill);

    tracing::info!(
        skills = registry.len(),
        patterns = router.pattern_count(),
        catch_all = ?settings.skills.catch_all,
        "Skill layer ready"
    );

    let config = OrchestratorConfig {
        verification: settings.verification.clone(),
        segmentation: settings.segmentation.clone(),
        silence_floor_db: settings.audio.silence_floor_db,
        phrases: Phrases::default(),
    };

    Ok(ConversationOrchestrator::new(
        config,
        detector,
        verifier,
        transcriber,
        router,
        Arc::new(registry),
        synthesizer,
    ))
}
