//! Voice Activity Detection and phrase segmentation.
//!
//! [`VadDetector`] wraps WebRTC VAD for per-frame speech decisions.
//! [`PhraseAccumulator`] turns that stream of decisions into phrases using a
//! pause threshold and a phrase time limit; it is pure and frame-clocked, so
//! the gap logic can be tested without a microphone.

use crate::audio::HeardPhrase;
use crate::error::{VoiceError, VoiceResult};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Configuration for VAD detection
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Sample rate (must be 8000, 16000, 32000, or 48000 Hz for WebRTC VAD)
    pub sample_rate: u32,

    /// Detection mode (0-3, where 3 is most aggressive)
    pub mode: u8,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            mode: 2,
        }
    }
}

fn vad_mode(mode: u8) -> VoiceResult<VadMode> {
    match mode {
        0 => Ok(VadMode::Quality),
        1 => Ok(VadMode::LowBitrate),
        2 => Ok(VadMode::Aggressive),
        3 => Ok(VadMode::VeryAggressive),
        other => Err(VoiceError::Config(format!("VAD mode must be 0-3, got {}", other))),
    }
}

fn vad_rate(sample_rate: u32) -> VoiceResult<SampleRate> {
    match sample_rate {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        other => Err(VoiceError::Config(format!(
            "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
            other
        ))),
    }
}

/// Voice Activity Detector using WebRTC VAD
pub struct VadDetector {
    vad: Vad,
    config: VadConfig,
    frame_size: usize,
}

impl VadDetector {
    pub fn new(config: VadConfig) -> VoiceResult<Self> {
        let mode = vad_mode(config.mode)?;
        let rate = vad_rate(config.sample_rate)?;

        // WebRTC VAD accepts 10, 20 or 30ms frames; 30ms at 16kHz = 480 samples
        let frame_size = (config.sample_rate as usize * 30) / 1000;

        let vad = Vad::new_with_rate_and_mode(rate, mode);
        debug!(
            "VAD ready ({}Hz, mode {}, {} samples/frame)",
            config.sample_rate, config.mode, frame_size
        );

        Ok(Self {
            vad,
            config,
            frame_size,
        })
    }

    /// Whether `frame` (exactly [`frame_size`](Self::frame_size) samples) contains speech.
    pub fn is_speech(&mut self, frame: &[f32]) -> VoiceResult<bool> {
        if frame.len() != self.frame_size {
            return Err(VoiceError::VadProcessing(format!(
                "Expected {} samples, got {}",
                self.frame_size,
                frame.len()
            )));
        }

        let pcm: Vec<i16> = frame
            .iter()
            .map(|&sample| (sample.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();

        self.vad
            .is_voice_segment(&pcm)
            .map_err(|_| VoiceError::VadProcessing("invalid frame length".to_string()))
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(30)
    }
}

/// How phrases are cut out of continuous audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseLimits {
    /// Trailing silence that ends a phrase.
    pub pause: Duration,
    /// Longest phrase; speech beyond this is committed as-is.
    pub phrase_limit: Duration,
    /// Voiced audio shorter than this is dropped as noise.
    pub min_speech: Duration,
}

impl PhraseLimits {
    /// Short, sensitive phrases for detecting interruptions while speaking.
    pub fn interruption() -> Self {
        Self {
            pause: Duration::from_millis(300),
            phrase_limit: Duration::from_secs(1),
            min_speech: Duration::from_millis(90),
        }
    }

    /// Full utterances for the voice chat loop.
    pub fn conversation() -> Self {
        Self {
            pause: Duration::from_millis(800),
            phrase_limit: Duration::from_secs(15),
            min_speech: Duration::from_millis(200),
        }
    }
}

impl Default for PhraseLimits {
    fn default() -> Self {
        Self::conversation()
    }
}

/// Gap logic over per-frame speech decisions.
#[derive(Debug)]
pub struct PhraseAccumulator {
    limits: PhraseLimits,
    frame: Duration,
    sample_rate: u32,
    buffer: Vec<f32>,
    in_phrase: bool,
    elapsed: Duration,
    trailing_silence: Duration,
}

impl PhraseAccumulator {
    pub fn new(limits: PhraseLimits, frame: Duration, sample_rate: u32) -> Self {
        Self {
            limits,
            frame,
            sample_rate,
            buffer: Vec::new(),
            in_phrase: false,
            elapsed: Duration::ZERO,
            trailing_silence: Duration::ZERO,
        }
    }

    /// Feed one frame; returns a phrase when the pause or the limit is reached.
    pub fn push(&mut self, is_speech: bool, frame: &[f32]) -> Option<HeardPhrase> {
        if !self.in_phrase {
            if !is_speech {
                return None;
            }
            debug!("🎤 Speech started");
            self.in_phrase = true;
            self.buffer.clear();
            self.elapsed = Duration::ZERO;
            self.trailing_silence = Duration::ZERO;
        }

        self.buffer.extend_from_slice(frame);
        self.elapsed += self.frame;
        if is_speech {
            self.trailing_silence = Duration::ZERO;
        } else {
            self.trailing_silence += self.frame;
        }

        if self.trailing_silence >= self.limits.pause || self.elapsed >= self.limits.phrase_limit {
            return self.commit();
        }
        None
    }

    /// Whether a phrase is currently being collected.
    pub fn in_phrase(&self) -> bool {
        self.in_phrase
    }

    fn commit(&mut self) -> Option<HeardPhrase> {
        let voiced = self.elapsed.saturating_sub(self.trailing_silence);
        let samples = std::mem::take(&mut self.buffer);
        let duration = self.elapsed;
        self.in_phrase = false;
        self.elapsed = Duration::ZERO;
        self.trailing_silence = Duration::ZERO;

        if voiced < self.limits.min_speech {
            debug!("⏭️ Speech too short ({:?}), ignoring", voiced);
            return None;
        }
        info!("🎯 Phrase committed: {:?}, {} samples", duration, samples.len());
        Some(HeardPhrase {
            samples,
            sample_rate: self.sample_rate,
            duration,
            timestamp: Utc::now(),
        })
    }
}

/// [`VadDetector`] feeding a [`PhraseAccumulator`].
pub struct PhraseDetector {
    vad: VadDetector,
    phrases: PhraseAccumulator,
}

impl PhraseDetector {
    pub fn new(config: VadConfig, limits: PhraseLimits) -> VoiceResult<Self> {
        let vad = VadDetector::new(config).map_err(|e| VoiceError::VadInit(e.to_string()))?;
        let phrases = PhraseAccumulator::new(limits, vad.frame_duration(), vad.sample_rate());
        Ok(Self { vad, phrases })
    }

    pub fn frame_size(&self) -> usize {
        self.vad.frame_size()
    }

    pub fn push_frame(&mut self, frame: &[f32]) -> VoiceResult<Option<HeardPhrase>> {
        let speech = self.vad.is_speech(frame)?;
        Ok(self.phrases.push(speech, frame))
    }
}
