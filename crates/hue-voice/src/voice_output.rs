//! **Voice output**: speech sinks with a common cancellation contract.
//!
//! A [`SpeechSink`] starts speaking one chunk and hands back a [`Playback`]
//! the player can poll and cancel. Three sinks:
//!
//! | Sink | How it speaks | Cancel |
//! |------|---------------|--------|
//! | [`ServiceSpeechSink`] | ElevenLabs synthesis, rodio playback | `Sink::stop` |
//! | [`CommandSpeechSink`] | one `say` (or similar) process per chunk | kill the process |
//! | [`FallbackSpeechSink`] | primary until it fails, then fallback for good | delegated |

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend that turns text into encoded audio (MP3/WAV).
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize text. An empty vec means nothing to play.
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// ElevenLabs text-to-speech (`POST /v1/text-to-speech/{voice_id}`).
#[derive(Debug, Clone)]
pub struct ElevenLabsTts {
    base_url: String,
    api_key: String,
    voice_id: String,
    model: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: model.into(),
            client,
        })
    }

    pub fn voice_id(&self) -> &str {
        &self.voice_id
    }
}

#[async_trait]
impl TtsBackend for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        if hue_core::is_placeholder_key(&self.api_key) {
            return Err(VoiceError::Tts("ELEVENLABS_API_KEY is not set".to_string()));
        }
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model,
        });
        let res = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Default output device, kept open on its own thread (`OutputStream` is !Send).
pub struct AudioOutput {
    handle: OutputStreamHandle,
    // Dropping the sender releases the device thread.
    _keepalive: std_mpsc::Sender<()>,
}

impl AudioOutput {
    pub fn open() -> VoiceResult<Self> {
        let (handle_tx, handle_rx) = std_mpsc::sync_channel::<VoiceResult<OutputStreamHandle>>(1);
        let (keepalive_tx, keepalive_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("hue-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Blocks until AudioOutput is dropped.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = handle_tx.send(Err(e.into()));
                }
            })?;

        let handle = handle_rx
            .recv()
            .map_err(|_| VoiceError::Playback("output thread exited during startup".to_string()))??;
        info!("🔊 Audio output ready");
        Ok(Self {
            handle,
            _keepalive: keepalive_tx,
        })
    }

    /// Decode `bytes` and start playing them on a fresh sink.
    pub fn play_bytes(&self, bytes: Vec<u8>) -> VoiceResult<Arc<Sink>> {
        let sink = Sink::try_new(&self.handle)?;
        let source = rodio::Decoder::new(Cursor::new(bytes))?;
        sink.append(source.convert_samples::<f32>());
        Ok(Arc::new(sink))
    }
}

/// One chunk being spoken.
pub trait Playback: Send {
    fn is_finished(&mut self) -> bool;
    /// Stop speaking now. Idempotent.
    fn cancel(&mut self);
}

/// Something that can speak a chunk of text.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Begin speaking `chunk`; returns once playback has started.
    async fn start(&self, chunk: &str) -> VoiceResult<Box<dyn Playback>>;

    fn name(&self) -> &'static str;
}

/// Playback with nothing to play.
struct Finished;

impl Playback for Finished {
    fn is_finished(&mut self) -> bool {
        true
    }

    fn cancel(&mut self) {}
}

struct SinkPlayback(Arc<Sink>);

impl Playback for SinkPlayback {
    fn is_finished(&mut self) -> bool {
        self.0.empty()
    }

    fn cancel(&mut self) {
        self.0.stop();
    }
}

/// Remote synthesis played through [`AudioOutput`].
pub struct ServiceSpeechSink {
    tts: Arc<dyn TtsBackend>,
    output: AudioOutput,
}

impl ServiceSpeechSink {
    pub fn new(tts: Arc<dyn TtsBackend>, output: AudioOutput) -> Self {
        Self { tts, output }
    }
}

#[async_trait]
impl SpeechSink for ServiceSpeechSink {
    async fn start(&self, chunk: &str) -> VoiceResult<Box<dyn Playback>> {
        let audio = self.tts.synthesize(chunk).await?;
        if audio.is_empty() {
            return Ok(Box::new(Finished));
        }
        debug!("Playing {} bytes of synthesized audio", audio.len());
        let sink = self.output.play_bytes(audio)?;
        Ok(Box::new(SinkPlayback(sink)))
    }

    fn name(&self) -> &'static str {
        "service"
    }
}

/// Local TTS command (macOS `say`, `espeak`, ...), text passed as the last argument.
#[derive(Debug, Clone)]
pub struct CommandSpeechSink {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the text.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

struct ChildPlayback(tokio::process::Child);

impl Playback for ChildPlayback {
    fn is_finished(&mut self) -> bool {
        !matches!(self.0.try_wait(), Ok(None))
    }

    fn cancel(&mut self) {
        if let Err(e) = self.0.start_kill() {
            debug!("TTS process already gone: {}", e);
        }
    }
}

#[async_trait]
impl SpeechSink for CommandSpeechSink {
    async fn start(&self, chunk: &str) -> VoiceResult<Box<dyn Playback>> {
        if chunk.trim().is_empty() {
            return Ok(Box::new(Finished));
        }
        let child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(chunk)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("failed to run {}: {}", self.program, e)))?;
        Ok(Box::new(ChildPlayback(child)))
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Uses `primary` until it fails once, then `fallback` for the rest of the process.
pub struct FallbackSpeechSink {
    primary: Arc<dyn SpeechSink>,
    fallback: Arc<dyn SpeechSink>,
    degraded: AtomicBool,
}

impl FallbackSpeechSink {
    pub fn new(primary: Arc<dyn SpeechSink>, fallback: Arc<dyn SpeechSink>) -> Self {
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether the primary sink has been abandoned.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSink for FallbackSpeechSink {
    async fn start(&self, chunk: &str) -> VoiceResult<Box<dyn Playback>> {
        if !self.is_degraded() {
            match self.primary.start(chunk).await {
                Ok(playback) => return Ok(playback),
                Err(e) => {
                    warn!(
                        "{} TTS failed ({}), falling back to {} TTS",
                        self.primary.name(),
                        e,
                        self.fallback.name()
                    );
                    self.degraded.store(true, Ordering::SeqCst);
                }
            }
        }
        self.fallback.start(chunk).await
    }

    fn name(&self) -> &'static str {
        if self.is_degraded() {
            self.fallback.name()
        } else {
            self.primary.name()
        }
    }
}
