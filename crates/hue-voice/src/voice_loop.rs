//! **Voice chat loop**: listen, answer, speak, repeat until an exit phrase.

use crate::audio::PhraseSource;
use crate::error::VoiceResult;
use crate::stt::{Recognition, SpeechRecognizer};
use crate::turn::{TurnController, TurnOutcome, TurnPhase};
use crate::vad::PhraseLimits;
use std::sync::Arc;
use hue_core::HueConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

const FAREWELL: &str = "Goodbye!";

/// Knobs for [`run_voice_chat`] and [`listen_once`].
#[derive(Debug, Clone)]
pub struct ChatLoopOptions {
    /// Matched case-insensitively against the whole utterance.
    pub exit_phrases: Vec<String>,
    /// How long to wait for the user to start talking.
    pub listen_timeout: Duration,
    /// Longest wait for a reply to finish speaking.
    pub speech_wait: Duration,
    pub limits: PhraseLimits,
}

impl Default for ChatLoopOptions {
    fn default() -> Self {
        Self {
            exit_phrases: ["exit", "goodbye", "quit", "stop", "end"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            listen_timeout: Duration::from_secs(5),
            speech_wait: Duration::from_secs(30),
            limits: PhraseLimits::conversation(),
        }
    }
}

impl ChatLoopOptions {
    pub fn from_config(config: &HueConfig) -> Self {
        Self {
            exit_phrases: config.exit_phrases.clone(),
            listen_timeout: config.listen_timeout(),
            ..Default::default()
        }
    }

    pub fn is_exit(&self, utterance: &str) -> bool {
        let utterance = utterance.trim().to_lowercase();
        self.exit_phrases
            .iter()
            .any(|p| p.trim().to_lowercase() == utterance)
    }
}

/// Open the listener, wait for one phrase, close it, recognize.
/// `Ok(None)` when nothing intelligible was said in time.
pub async fn listen(
    listener: &dyn PhraseSource,
    recognizer: &dyn SpeechRecognizer,
    options: &ChatLoopOptions,
) -> VoiceResult<Option<String>> {
    info!("Listening...");
    let mut stream = listener.open(options.limits)?;
    // The phrase is only delivered once it ends, so the wait covers its full length.
    let wait = options.listen_timeout + options.limits.phrase_limit + options.limits.pause;
    let phrase = tokio::time::timeout(wait, stream.next_phrase()).await;
    drop(stream);

    let phrase = match phrase {
        Ok(Some(phrase)) => phrase,
        Ok(None) | Err(_) => {
            debug!("No speech detected within timeout");
            return Ok(None);
        }
    };

    info!("Processing speech...");
    match recognizer.recognize(&phrase).await? {
        Recognition::Text(text) => {
            info!("Heard: {}", text);
            Ok(Some(text))
        }
        Recognition::NoMatch => {
            warn!("Could not understand audio");
            Ok(None)
        }
    }
}

/// One listen → process cycle. Returns the reply text without speaking it.
pub async fn listen_once(
    controller: &TurnController,
    listener: &dyn PhraseSource,
    recognizer: &dyn SpeechRecognizer,
    options: &ChatLoopOptions,
) -> VoiceResult<Option<String>> {
    let Some(input) = listen(listener, recognizer, options).await? else {
        return Ok(None);
    };
    let outcome = process_listening(controller, listener, &input).await?;
    Ok(Some(outcome.into_text()))
}

/// Conversation loop. Runs until an exit phrase is heard or
/// [`TurnController::stop_listening`] is called; always clears the listening flag.
pub async fn run_voice_chat(
    controller: &TurnController,
    listener: &dyn PhraseSource,
    recognizer: &dyn SpeechRecognizer,
    options: &ChatLoopOptions,
) -> VoiceResult<()> {
    info!("=== Starting Voice Chat ===");
    info!("Say one of {:?} to exit", options.exit_phrases);
    controller.start_listening();

    while controller.is_listening() {
        if let Err(e) = chat_iteration(controller, listener, recognizer, options).await {
            warn!("Voice chat error: {}", e);
            controller
                .violation_log()
                .record(format!("Voice chat error: {}", e));
            // avoid spinning on a device that keeps failing
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    controller.stop_listening();
    info!("=== Voice Chat Ended ===");
    Ok(())
}

async fn chat_iteration(
    controller: &TurnController,
    listener: &dyn PhraseSource,
    recognizer: &dyn SpeechRecognizer,
    options: &ChatLoopOptions,
) -> VoiceResult<()> {
    let Some(input) = listen(listener, recognizer, options).await? else {
        return Ok(());
    };

    if options.is_exit(&input) {
        info!("Exit phrase detected. Ending voice chat.");
        speak_and_wait(controller, FAREWELL, options.speech_wait).await?;
        controller.stop_listening();
        return Ok(());
    }

    info!("Processing: {}", input);
    let outcome = process_listening(controller, listener, &input).await?;
    if outcome.is_interrupted() || outcome.text().trim().is_empty() {
        return Ok(());
    }
    info!("Response: {}", outcome.text());
    speak_and_wait(controller, outcome.text(), options.speech_wait).await
}

/// Run `process_turn` with the microphone open in interruption mode, so a
/// phrase heard during the silence wait cuts the turn short.
async fn process_listening(
    controller: &TurnController,
    listener: &dyn PhraseSource,
    input: &str,
) -> VoiceResult<TurnOutcome> {
    let mut heard = listener.open(PhraseLimits::interruption())?;
    let turn = controller.process_turn(input);
    tokio::pin!(turn);

    let outcome = loop {
        tokio::select! {
            biased;
            outcome = &mut turn => break outcome,
            Some(_) = heard.next_phrase() => {
                if controller.phase() == TurnPhase::WaitingForSilence {
                    info!("🔊 User spoke during the silence wait");
                    controller.signal_interruption();
                }
            }
        }
    };
    drop(heard);
    Ok(outcome)
}

async fn speak_and_wait(controller: &TurnController, text: &str, limit: Duration) -> VoiceResult<()> {
    let handle = controller.speak(text)?;
    let session = Arc::clone(handle.session());
    let wait = handle.wait();
    tokio::pin!(wait);

    let report = match tokio::time::timeout(limit, &mut wait).await {
        Ok(report) => report?,
        Err(_) => {
            // Stop it rather than leave it holding the microphone.
            warn!("Speech still running after {:?}, stopping it", limit);
            session.mark_interrupted();
            wait.await?
        }
    };
    match report.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
