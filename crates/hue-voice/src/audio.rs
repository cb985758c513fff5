//! Microphone capture and the phrase-source seam.
//!
//! A [`PhraseSource`] hands out a [`PhraseStream`] of VAD-delimited phrases for
//! as long as the stream is alive. The production source, [`MicrophoneInput`],
//! runs cpal capture and webrtc VAD on a dedicated thread (cpal `Stream` is
//! !Send on some platforms) and stops it when the stream is dropped.

use crate::error::{VoiceError, VoiceResult};
use crate::vad::{PhraseDetector, PhraseLimits, VadConfig};
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// VAD frame in samples (default: 480 for 30ms at 16kHz)
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_size: 480, // 30ms at 16kHz
        }
    }
}

impl AudioConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

/// One detected phrase: the buffered PCM from speech start until the pause.
#[derive(Debug, Clone)]
pub struct HeardPhrase {
    /// PCM samples (f32, -1.0..1.0), mono.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Length of the phrase including trailing silence.
    pub duration: Duration,
    /// When the phrase was committed.
    pub timestamp: DateTime<Utc>,
}

/// Phrases from an open capture. Dropping the stream closes the capture.
pub struct PhraseStream {
    // Dropped before the capture so a capture blocked on a full channel can exit.
    rx: mpsc::Receiver<HeardPhrase>,
    _capture: Option<Box<dyn Any + Send>>,
}

impl PhraseStream {
    /// Stream backed by a running capture; `capture` is dropped with the stream.
    pub fn new(rx: mpsc::Receiver<HeardPhrase>, capture: impl Any + Send) -> Self {
        Self {
            rx,
            _capture: Some(Box::new(capture)),
        }
    }

    /// Stream without a device behind it (scripted sources).
    pub fn from_receiver(rx: mpsc::Receiver<HeardPhrase>) -> Self {
        Self { rx, _capture: None }
    }

    /// Next phrase, or `None` once the capture has stopped.
    pub async fn next_phrase(&mut self) -> Option<HeardPhrase> {
        self.rx.recv().await
    }
}

/// Something that can listen for phrases.
pub trait PhraseSource: Send + Sync {
    /// Check that the input device exists and can be configured.
    fn probe(&self) -> VoiceResult<()>;

    /// Start capturing with the given phrase limits.
    fn open(&self, limits: PhraseLimits) -> VoiceResult<PhraseStream>;
}

/// Default-device microphone with webrtc VAD phrase detection.
#[derive(Debug, Clone, Default)]
pub struct MicrophoneInput {
    config: AudioConfig,
}

impl MicrophoneInput {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

impl PhraseSource for MicrophoneInput {
    fn probe(&self) -> VoiceResult<()> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioUnavailable("No input device available".to_string()))?;
        let default_config = device.default_input_config()?;
        info!(
            "🎤 Input device: {} ({:?})",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            default_config
        );
        Ok(())
    }

    fn open(&self, limits: PhraseLimits) -> VoiceResult<PhraseStream> {
        let (phrase_tx, phrase_rx) = mpsc::channel(8);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<VoiceResult<()>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let thread_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("hue-capture".to_string())
            .spawn(move || capture_thread(config, limits, phrase_tx, ready_tx, thread_stop))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(PhraseStream::new(
                phrase_rx,
                CaptureHandle {
                    stop,
                    thread: Some(thread),
                },
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::AudioStream(
                "capture thread exited during startup".to_string(),
            )),
        }
    }
}

/// Stops the capture thread when dropped and waits until it has released the
/// device, so the next `open` never overlaps it. The wait is bounded by one
/// `CAPTURE_POLL`.
struct CaptureHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Capture thread panicked");
            }
        }
    }
}

const CAPTURE_POLL: Duration = Duration::from_millis(50);

fn capture_thread(
    config: AudioConfig,
    limits: PhraseLimits,
    phrase_tx: mpsc::Sender<HeardPhrase>,
    ready_tx: std_mpsc::SyncSender<VoiceResult<()>>,
    stop: Arc<AtomicBool>,
) {
    let (sample_tx, sample_rx) = std_mpsc::channel::<Vec<f32>>();

    let setup = || -> VoiceResult<(cpal::Stream, PhraseDetector)> {
        let vad_config = VadConfig {
            sample_rate: config.sample_rate,
            ..Default::default()
        };
        let detector = PhraseDetector::new(vad_config, limits)?;
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioUnavailable("No input device available".to_string()))?;
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = sample_tx.send(data.to_vec());
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;
        Ok((stream, detector))
    };

    let (stream, mut detector) = match setup() {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));
    info!("▶️ Capture started ({}Hz)", config.sample_rate);

    let mut pending: Vec<f32> = Vec::with_capacity(config.frame_size * 2);
    'capture: while !stop.load(Ordering::SeqCst) {
        let samples = match sample_rx.recv_timeout(CAPTURE_POLL) {
            Ok(s) => s,
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };
        pending.extend_from_slice(&samples);
        while pending.len() >= config.frame_size {
            let frame: Vec<f32> = pending.drain(..config.frame_size).collect();
            match detector.push_frame(&frame) {
                Ok(Some(phrase)) => {
                    debug!("Phrase detected: {:?}", phrase.duration);
                    if phrase_tx.blocking_send(phrase).is_err() {
                        break 'capture;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("VAD frame skipped: {}", e),
            }
        }
    }

    drop(stream);
    info!("⏹️ Capture stopped");
}
