//! **Turn controller**: one conversational turn at a time.
//!
//! `process_turn` is the text path: silence gate, search grounding,
//! completion, shaping. `speak` is the audio path: a fresh [`SpeechSession`]
//! with the interruption monitor and the player running against it.

use crate::audio::{AudioConfig, MicrophoneInput, PhraseSource};
use crate::error::{VoiceError, VoiceResult};
use crate::monitor::InterruptionMonitor;
use crate::player::{PlaybackReport, PlayerConfig, SpeechPlayer};
use crate::session::SpeechSession;
use crate::stt::{SpeechRecognizer, WhisperApiRecognizer};
use crate::voice_output::{
    AudioOutput, CommandSpeechSink, ElevenLabsTts, FallbackSpeechSink, ServiceSpeechSink,
    SpeechSink,
};
use hue_core::{
    CompletionClient, CompletionTransport, ContextAugmenter, HueConfig, HueError, ResponseShaper,
    SearchBackend, SerpApiSearch, TtsBackendKind, Violation, ViolationLog, XaiChatTransport,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Text returned for a turn cut short during the silence wait.
pub const INTERRUPTED_SENTINEL: &str = "Interrupted";

/// Where `process_turn` currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnPhase {
    Idle = 0,
    WaitingForSilence = 1,
    Augmenting = 2,
    Completing = 3,
    Shaping = 4,
    ReadyToSpeak = 5,
}

impl TurnPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => TurnPhase::WaitingForSilence,
            2 => TurnPhase::Augmenting,
            3 => TurnPhase::Completing,
            4 => TurnPhase::Shaping,
            5 => TurnPhase::ReadyToSpeak,
            _ => TurnPhase::Idle,
        }
    }
}

/// Result of one turn. Always carries text that can be shown or spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Shaped model reply.
    Reply(String),
    /// Completion failed; `message` is the user-facing explanation.
    Failed { message: String, error: HueError },
    /// New user input arrived before the silence timeout elapsed.
    Interrupted,
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Reply(text) => text,
            TurnOutcome::Failed { message, .. } => message,
            TurnOutcome::Interrupted => INTERRUPTED_SENTINEL,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TurnOutcome::Reply(text) => text,
            TurnOutcome::Failed { message, .. } => message,
            TurnOutcome::Interrupted => INTERRUPTED_SENTINEL.to_string(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, TurnOutcome::Interrupted)
    }
}

/// External services the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchBackend>,
    pub completion: Arc<dyn CompletionTransport>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub phrase_source: Arc<dyn PhraseSource>,
    pub sink: Arc<dyn SpeechSink>,
}

impl Collaborators {
    /// Production adapters built from `config` (API keys from its secret fields).
    pub fn from_config(config: &HueConfig) -> VoiceResult<Self> {
        let search = SerpApiSearch::with_base_url(
            &config.search_url,
            config.serpapi_key.clone().unwrap_or_default(),
            config.search_timeout(),
        )?;
        let completion = XaiChatTransport::with_base_url(
            &config.completion_url,
            config.grok_api_key.clone().unwrap_or_default(),
            config.completion_timeout(),
        )?;
        let recognizer = WhisperApiRecognizer::new(
            &config.stt_url,
            config.stt_api_key.clone().unwrap_or_default(),
            &config.stt_model,
        )?;
        Ok(Self {
            search: Arc::new(search),
            completion: Arc::new(completion),
            recognizer: Arc::new(recognizer),
            phrase_source: Arc::new(MicrophoneInput::new(AudioConfig::default())),
            sink: speech_sink(config)?,
        })
    }
}

fn speech_sink(config: &HueConfig) -> VoiceResult<Arc<dyn SpeechSink>> {
    let system: Arc<dyn SpeechSink> = Arc::new(CommandSpeechSink::new(&config.system_tts_command));
    if config.tts_backend == TtsBackendKind::System {
        info!("🗣️ Using system TTS ({})", config.system_tts_command);
        return Ok(system);
    }
    let Some(key) = config.elevenlabs_api_key.clone() else {
        warn!("ELEVENLABS_API_KEY not set, using system TTS");
        return Ok(system);
    };
    let output = match AudioOutput::open() {
        Ok(output) => output,
        Err(e) => {
            warn!("Audio output unavailable ({}), using system TTS", e);
            return Ok(system);
        }
    };
    let tts = ElevenLabsTts::new(&config.tts_url, key, &config.voice_id, &config.tts_model)?;
    info!("🗣️ Using ElevenLabs TTS (voice: {})", config.voice_id);
    let service: Arc<dyn SpeechSink> = Arc::new(ServiceSpeechSink::new(Arc::new(tts), output));
    Ok(Arc::new(FallbackSpeechSink::new(service, system)))
}

/// How one `speak` call ended.
#[derive(Debug)]
pub struct SpeechReport {
    pub session_id: u64,
    pub interrupted: bool,
    /// `None` when the session ended before playback started.
    pub playback: Option<PlaybackReport>,
    /// Monitor or playback failure that ended the session early.
    pub error: Option<VoiceError>,
}

/// A running utterance.
pub struct SpeechHandle {
    session: Arc<SpeechSession>,
    task: JoinHandle<SpeechReport>,
}

impl SpeechHandle {
    pub fn session(&self) -> &Arc<SpeechSession> {
        &self.session
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the utterance to end.
    pub async fn wait(self) -> VoiceResult<SpeechReport> {
        self.task
            .await
            .map_err(|e| VoiceError::SessionFailed(e.to_string()))
    }
}

pub struct TurnController {
    violations: ViolationLog,
    silence_timeout: Duration,
    poll_interval: Duration,
    monitor_warmup: Duration,
    augmenter: ContextAugmenter,
    completion: CompletionClient,
    shaper: ResponseShaper,
    monitor: InterruptionMonitor,
    player: SpeechPlayer,
    phase: AtomicU8,
    interrupt: AtomicBool,
    listening: AtomicBool,
    current: Mutex<Option<Arc<SpeechSession>>>,
    next_session: AtomicU64,
}

impl TurnController {
    /// Build a controller. Fails with [`VoiceError::AudioUnavailable`] when the
    /// phrase source has no working input device.
    pub fn new(config: &HueConfig, collaborators: Collaborators) -> VoiceResult<Self> {
        config.validate()?;
        collaborators.phrase_source.probe()?;

        let violations = ViolationLog::new();
        let augmenter = ContextAugmenter::new(collaborators.search, violations.clone());
        let completion = CompletionClient::new(
            collaborators.completion,
            config.models.clone(),
            violations.clone(),
        );
        let shaper = ResponseShaper::new(config.shape_policy(), violations.clone());
        let monitor = InterruptionMonitor::new(
            collaborators.phrase_source,
            collaborators.recognizer,
            violations.clone(),
        );
        let player = SpeechPlayer::new(collaborators.sink, PlayerConfig::from_config(config));

        info!(
            "✅ Turn controller ready (silence {:?}, max {} words, {} models)",
            config.silence_timeout(),
            config.max_response_words,
            config.models.len()
        );

        Ok(Self {
            violations,
            silence_timeout: config.silence_timeout(),
            poll_interval: config.poll_interval(),
            monitor_warmup: config.monitor_warmup(),
            augmenter,
            completion,
            shaper,
            monitor,
            player,
            phase: AtomicU8::new(TurnPhase::Idle as u8),
            interrupt: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            current: Mutex::new(None),
            next_session: AtomicU64::new(1),
        })
    }

    /// Controller with the production adapters.
    pub fn from_config(config: &HueConfig) -> VoiceResult<Self> {
        Self::new(config, Collaborators::from_config(config)?)
    }

    /// Run one turn. Never fails: errors come back as [`TurnOutcome::Failed`].
    pub async fn process_turn(&self, input: &str) -> TurnOutcome {
        if !self.wait_for_silence().await {
            self.violations
                .record("Response withheld: user spoke during the silence wait");
            self.set_phase(TurnPhase::Idle);
            return TurnOutcome::Interrupted;
        }

        self.set_phase(TurnPhase::Augmenting);
        let context = self.augmenter.augment(input).await;

        self.set_phase(TurnPhase::Completing);
        let reply = match self.completion.complete(input, context.as_deref()).await {
            Ok(reply) => reply,
            Err(error) => {
                self.set_phase(TurnPhase::Idle);
                return TurnOutcome::Failed {
                    message: error.user_message(),
                    error,
                };
            }
        };

        self.set_phase(TurnPhase::Shaping);
        let shaped = self.shaper.shape(&reply, input);
        self.set_phase(TurnPhase::ReadyToSpeak);
        TurnOutcome::Reply(shaped)
    }

    /// Tell a pending silence wait that the user has started talking again.
    pub fn signal_interruption(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    // false = interrupted
    async fn wait_for_silence(&self) -> bool {
        self.set_phase(TurnPhase::WaitingForSilence);
        self.interrupt.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + self.silence_timeout;
        loop {
            if self.interrupt.swap(false, Ordering::SeqCst) {
                info!("Silence wait interrupted");
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Speak `text` in the background. Must be called inside a tokio runtime.
    pub fn speak(&self, text: &str) -> VoiceResult<SpeechHandle> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(active) = current.as_ref().filter(|s| s.is_speaking()) {
            return Err(VoiceError::SessionActive(active.id()));
        }

        let session = SpeechSession::new(self.next_session.fetch_add(1, Ordering::SeqCst));
        let speaking = session.begin();
        *current = Some(Arc::clone(&session));
        drop(current);

        let monitor = self.monitor.clone();
        let player = self.player.clone();
        let violations = self.violations.clone();
        let warmup = self.monitor_warmup;
        let text = text.to_string();
        let task_session = Arc::clone(&session);

        let task = tokio::spawn(async move {
            let _speaking = speaking;
            let session = task_session;
            let mut report = SpeechReport {
                session_id: session.id(),
                interrupted: false,
                playback: None,
                error: None,
            };

            // Dropping the handle on unwind also stops the monitor.
            let monitor = match monitor.start(Arc::clone(&session)) {
                Ok(handle) => handle,
                Err(e) => {
                    error!("❌ Failed to start interruption detection: {}", e);
                    violations.record(format!("Speech session {} aborted: {}", session.id(), e));
                    report.error = Some(e);
                    return report;
                }
            };
            tokio::time::sleep(warmup).await;

            match player.play(&text, &session).await {
                Ok(playback) => report.playback = Some(playback),
                Err(e) => {
                    error!("❌ Speech playback failed: {}", e);
                    violations.record(format!("Speech session {} failed: {}", session.id(), e));
                    report.error = Some(e);
                }
            }
            // The input device is free again once this returns.
            monitor.shutdown().await;
            report.interrupted = session.is_interrupted();
            report
        });

        Ok(SpeechHandle { session, task })
    }

    pub fn start_listening(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    /// Idempotent.
    pub fn stop_listening(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            info!("Stopped listening");
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|s| s.is_speaking())
    }

    pub fn phase(&self) -> TurnPhase {
        TurnPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.violations.snapshot()
    }

    pub fn clear_violations(&self) {
        self.violations.clear();
    }

    /// Shared log, for collaborators that record on the controller's behalf.
    pub fn violation_log(&self) -> &ViolationLog {
        &self.violations
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }
}
