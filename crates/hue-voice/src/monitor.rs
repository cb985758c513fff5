//! **Interruption monitor**: listens while the agent talks.
//!
//! Every phrase heard while the session is speaking goes to the recognizer.
//! Recognized text, "no match" and recognizer errors all interrupt: if there
//! was enough audio to form a phrase, the user was talking over the agent.

use crate::audio::{HeardPhrase, PhraseSource, PhraseStream};
use crate::error::VoiceResult;
use crate::session::SpeechSession;
use crate::stt::{Recognition, SpeechRecognizer};
use crate::vad::PhraseLimits;
use hue_core::ViolationLog;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Starts one listening task per speech session.
#[derive(Clone)]
pub struct InterruptionMonitor {
    source: Arc<dyn PhraseSource>,
    recognizer: Arc<dyn SpeechRecognizer>,
    violations: ViolationLog,
    limits: PhraseLimits,
}

impl InterruptionMonitor {
    pub fn new(
        source: Arc<dyn PhraseSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
        violations: ViolationLog,
    ) -> Self {
        Self {
            source,
            recognizer,
            violations,
            limits: PhraseLimits::interruption(),
        }
    }

    pub fn with_limits(mut self, limits: PhraseLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Open the phrase source and watch `session` until the handle is dropped,
    /// the session is interrupted, or the source closes.
    pub fn start(&self, session: Arc<SpeechSession>) -> VoiceResult<MonitorHandle> {
        let stream = self.source.open(self.limits)?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let recognizer = Arc::clone(&self.recognizer);
        let violations = self.violations.clone();
        info!("🎤 Interruption monitor started (session {})", session.id());

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = stop_rx => debug!("Interruption monitor stopped (session {})", session.id()),
                _ = watch(stream, recognizer, violations, Arc::clone(&session)) => {}
            }
        });

        Ok(MonitorHandle {
            stop: Some(stop_tx),
            task: Some(task),
        })
    }
}

async fn watch(
    mut stream: PhraseStream,
    recognizer: Arc<dyn SpeechRecognizer>,
    violations: ViolationLog,
    session: Arc<SpeechSession>,
) {
    while let Some(phrase) = stream.next_phrase().await {
        if !session.is_speaking() {
            debug!("Phrase heard after speech ended, ignoring");
            continue;
        }
        info!("🔊 Audio detected during speech - checking for interruption...");
        let cause = interruption_cause(recognizer.as_ref(), &phrase).await;
        if session.mark_interrupted() {
            info!("🚨 {}", cause);
            violations.record(cause);
        }
        break;
    }
}

async fn interruption_cause(recognizer: &dyn SpeechRecognizer, phrase: &HeardPhrase) -> String {
    match recognizer.recognize(phrase).await {
        Ok(Recognition::Text(text)) => format!("Speech interrupted by user input: {}", text),
        Ok(Recognition::NoMatch) => "Speech interrupted by unrecognized audio".to_string(),
        Err(e) => format!("Speech interrupted by audio (recognition error: {})", e),
    }
}

/// Stops the monitor task when dropped; [`shutdown`](Self::shutdown) also waits for it.
pub struct MonitorHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// True once the watcher has exited (interruption, closed source, or stop).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the watcher and wait until it has dropped its phrase stream.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Hands out one pre-filled stream.
    struct OneShotSource {
        rx: Mutex<Option<mpsc::Receiver<HeardPhrase>>>,
    }

    impl PhraseSource for OneShotSource {
        fn probe(&self) -> VoiceResult<()> {
            Ok(())
        }

        fn open(&self, _limits: PhraseLimits) -> VoiceResult<PhraseStream> {
            self.rx
                .lock()
                .unwrap()
                .take()
                .map(PhraseStream::from_receiver)
                .ok_or_else(|| VoiceError::AudioUnavailable("already opened".into()))
        }
    }

    struct FixedRecognizer(VoiceResult<Recognition>);

    #[async_trait]
    impl SpeechRecognizer for FixedRecognizer {
        async fn recognize(&self, _phrase: &HeardPhrase) -> VoiceResult<Recognition> {
            match &self.0 {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(VoiceError::Stt(e.to_string())),
            }
        }
    }

    fn phrase() -> HeardPhrase {
        HeardPhrase {
            samples: vec![0.3; 4800],
            sample_rate: 16000,
            duration: Duration::from_millis(300),
            timestamp: Utc::now(),
        }
    }

    async fn run_with(result: VoiceResult<Recognition>) -> (Arc<SpeechSession>, ViolationLog) {
        let (tx, rx) = mpsc::channel(4);
        let source = Arc::new(OneShotSource {
            rx: Mutex::new(Some(rx)),
        });
        let log = ViolationLog::new();
        let monitor =
            InterruptionMonitor::new(source, Arc::new(FixedRecognizer(result)), log.clone());
        let session = SpeechSession::new(7);
        let _speaking = session.begin();
        let handle = monitor.start(Arc::clone(&session)).unwrap();
        tx.send(phrase()).await.unwrap();
        tx.send(phrase()).await.unwrap();
        for _ in 0..50 {
            if session.is_interrupted() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        (session, log)
    }

    #[tokio::test]
    async fn recognized_text_interrupts_once() {
        let (session, log) = run_with(Ok(Recognition::Text("wait stop".into()))).await;
        assert!(session.is_interrupted());
        let log = log.snapshot();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "Speech interrupted by user input: wait stop");
    }

    #[tokio::test]
    async fn unrecognized_audio_still_interrupts() {
        let (session, log) = run_with(Ok(Recognition::NoMatch)).await;
        assert!(session.is_interrupted());
        assert!(log.snapshot()[0].message.contains("unrecognized audio"));
    }

    #[tokio::test]
    async fn recognizer_error_still_interrupts() {
        let (session, log) = run_with(Err(VoiceError::Stt("503".into()))).await;
        assert!(session.is_interrupted());
        assert!(log.snapshot()[0].message.contains("recognition error"));
    }

    #[tokio::test]
    async fn phrases_after_speaking_are_ignored() {
        let (tx, rx) = mpsc::channel(4);
        let source = Arc::new(OneShotSource {
            rx: Mutex::new(Some(rx)),
        });
        let log = ViolationLog::new();
        let recognizer = Arc::new(CountingRecognizer::default());
        let monitor = InterruptionMonitor::new(source, recognizer.clone(), log.clone());
        let session = SpeechSession::new(8);
        let speaking = session.begin();
        let handle = monitor.start(Arc::clone(&session)).unwrap();
        drop(speaking);

        tx.send(phrase()).await.unwrap();
        drop(tx);
        // The watcher exits on its own once it has drained the closed stream.
        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(handle.is_finished());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert!(!session.is_interrupted());
        assert!(log.is_empty());
    }

    #[derive(Default)]
    struct CountingRecognizer {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SpeechRecognizer for CountingRecognizer {
        async fn recognize(&self, _phrase: &HeardPhrase) -> VoiceResult<Recognition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Recognition::NoMatch)
        }
    }
}
