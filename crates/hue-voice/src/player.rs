//! **Speech player**: speaks a reply in small chunks so it can be cut off.

use crate::error::VoiceResult;
use crate::session::SpeechSession;
use crate::voice_output::SpeechSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Words per chunk (default 5).
    pub chunk_words: usize,
    /// Interruption check interval (default 100ms).
    pub poll_interval: Duration,
    /// A chunk still "playing" after this long is cancelled (default 3s).
    pub chunk_ceiling: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_words: 5,
            poll_interval: Duration::from_millis(100),
            chunk_ceiling: Duration::from_secs(3),
        }
    }
}

impl PlayerConfig {
    pub fn from_config(config: &hue_core::HueConfig) -> Self {
        Self {
            chunk_words: config.chunk_words.max(1),
            poll_interval: config.poll_interval(),
            chunk_ceiling: config.chunk_ceiling(),
        }
    }
}

/// What happened to one utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackReport {
    pub chunks_total: usize,
    /// Chunks started (the interrupted one included).
    pub chunks_started: usize,
    pub interrupted: bool,
}

/// Split `text` into chunks of at most `words` whitespace-separated words.
pub fn chunk_text(text: &str, words: usize) -> Vec<String> {
    let all: Vec<&str> = text.split_whitespace().collect();
    all.chunks(words.max(1)).map(|c| c.join(" ")).collect()
}

#[derive(Clone)]
pub struct SpeechPlayer {
    sink: Arc<dyn SpeechSink>,
    config: PlayerConfig,
}

impl SpeechPlayer {
    pub fn new(sink: Arc<dyn SpeechSink>, config: PlayerConfig) -> Self {
        Self { sink, config }
    }

    /// Speak `text` chunk by chunk, stopping as soon as `session` is interrupted.
    pub async fn play(&self, text: &str, session: &SpeechSession) -> VoiceResult<PlaybackReport> {
        let chunks = chunk_text(text, self.config.chunk_words);
        let mut report = PlaybackReport {
            chunks_total: chunks.len(),
            ..Default::default()
        };
        info!("🔊 Speaking {} chunk(s) via {} TTS", chunks.len(), self.sink.name());

        for chunk in &chunks {
            if session.is_interrupted() {
                report.interrupted = true;
                break;
            }
            report.chunks_started += 1;

            let started = tokio::select! {
                biased;
                _ = self.wait_for_interrupt(session) => None,
                playback = self.sink.start(chunk) => Some(playback?),
            };
            let Some(mut playback) = started else {
                info!("🚨 Speech interrupted during synthesis");
                report.interrupted = true;
                break;
            };

            let deadline = Instant::now() + self.config.chunk_ceiling;
            loop {
                if session.is_interrupted() {
                    info!("🚨 Interruption detected during chunk, stopping playback");
                    playback.cancel();
                    report.interrupted = true;
                    break;
                }
                if playback.is_finished() {
                    break;
                }
                if Instant::now() >= deadline {
                    warn!("Chunk still playing after {:?}, cancelling", self.config.chunk_ceiling);
                    playback.cancel();
                    break;
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
            if report.interrupted {
                break;
            }
            debug!("Chunk done: {:?}", chunk);
        }

        Ok(report)
    }

    async fn wait_for_interrupt(&self, session: &SpeechSession) {
        while !session.is_interrupted() {
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice_output::Playback;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn chunks_of_five_words() {
        let chunks = chunk_text("one two three four five six seven", 5);
        assert_eq!(chunks, vec!["one two three four five", "six seven"]);
        assert!(chunk_text("   ", 5).is_empty());
        assert_eq!(chunk_text("a b", 0), vec!["a", "b"]);
    }

    /// Each chunk "plays" for a fixed time; records what was started and cancelled.
    struct TimedSink {
        play_for: Duration,
        started: Arc<Mutex<Vec<String>>>,
        cancelled: Arc<Mutex<usize>>,
    }

    struct TimedPlayback {
        until: Instant,
        cancelled: Arc<Mutex<usize>>,
        stopped: bool,
    }

    impl Playback for TimedPlayback {
        fn is_finished(&mut self) -> bool {
            self.stopped || Instant::now() >= self.until
        }

        fn cancel(&mut self) {
            if !self.stopped {
                self.stopped = true;
                *self.cancelled.lock().unwrap() += 1;
            }
        }
    }

    #[async_trait]
    impl SpeechSink for TimedSink {
        async fn start(&self, chunk: &str) -> VoiceResult<Box<dyn Playback>> {
            self.started.lock().unwrap().push(chunk.to_string());
            Ok(Box::new(TimedPlayback {
                until: Instant::now() + self.play_for,
                cancelled: Arc::clone(&self.cancelled),
                stopped: false,
            }))
        }

        fn name(&self) -> &'static str {
            "timed"
        }
    }

    fn timed(play_for: Duration) -> (Arc<TimedSink>, Arc<Mutex<Vec<String>>>, Arc<Mutex<usize>>) {
        let started = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(Mutex::new(0));
        let sink = Arc::new(TimedSink {
            play_for,
            started: Arc::clone(&started),
            cancelled: Arc::clone(&cancelled),
        });
        (sink, started, cancelled)
    }

    fn fast_config() -> PlayerConfig {
        PlayerConfig {
            chunk_words: 2,
            poll_interval: Duration::from_millis(5),
            chunk_ceiling: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn plays_every_chunk_when_uninterrupted() {
        let (sink, started, cancelled) = timed(Duration::from_millis(10));
        let player = SpeechPlayer::new(sink, fast_config());
        let session = SpeechSession::new(1);
        let _speaking = session.begin();
        let report = player.play("a b c d e", &session).await.unwrap();
        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_started, 3);
        assert!(!report.interrupted);
        assert_eq!(started.lock().unwrap().as_slice(), ["a b", "c d", "e"]);
        assert_eq!(*cancelled.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn interruption_mid_chunk_cancels_and_stops() {
        let (sink, started, cancelled) = timed(Duration::from_secs(2));
        let player = SpeechPlayer::new(sink, fast_config());
        let session = SpeechSession::new(2);
        let _speaking = session.begin();

        let s = Arc::clone(&session);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            s.mark_interrupted();
        });

        let report = player.play("hello there general kenobi", &session).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.chunks_started, 1);
        assert_eq!(started.lock().unwrap().len(), 1);
        assert_eq!(*cancelled.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn already_interrupted_session_speaks_nothing() {
        let (sink, started, _) = timed(Duration::from_millis(10));
        let player = SpeechPlayer::new(sink, fast_config());
        let session = SpeechSession::new(3);
        let _speaking = session.begin();
        session.mark_interrupted();
        let report = player.play("a b c", &session).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.chunks_started, 0);
        assert!(started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ceiling_cancels_a_stuck_chunk() {
        let (sink, started, cancelled) = timed(Duration::from_secs(60));
        let config = PlayerConfig {
            chunk_ceiling: Duration::from_millis(30),
            ..fast_config()
        };
        let player = SpeechPlayer::new(sink, config);
        let session = SpeechSession::new(4);
        let _speaking = session.begin();
        let report = player.play("a b c d", &session).await.unwrap();
        assert!(!report.interrupted);
        assert_eq!(started.lock().unwrap().len(), 2);
        assert_eq!(*cancelled.lock().unwrap(), 2);
    }
}
