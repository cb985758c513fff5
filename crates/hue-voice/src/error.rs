//! Error types for the Hue voice crate

use hue_core::{ErrorKind, HueError};
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while listening, recognizing or speaking
#[derive(Error, Debug)]
pub enum VoiceError {
    /// No usable input device. Fatal at controller construction.
    #[error("Audio unavailable: {0}")]
    AudioUnavailable(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("VAD initialization failed: {0}")]
    VadInit(String),

    #[error("VAD processing error: {0}")]
    VadProcessing(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    /// `speak` was called while the previous utterance is still playing.
    #[error("Speech session {0} is still active")]
    SessionActive(u64),

    /// The session task ended without producing a report (panic or abort).
    #[error("Speech session failed: {0}")]
    SessionFailed(String),

    #[error(transparent)]
    Core(#[from] HueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Core error kind this failure corresponds to, when there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            VoiceError::AudioUnavailable(_) => Some(ErrorKind::AudioUnavailable),
            VoiceError::Core(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioUnavailable(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<rodio::StreamError> for VoiceError {
    fn from(err: rodio::StreamError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<rodio::PlayError> for VoiceError {
    fn from(err: rodio::PlayError) -> Self {
        VoiceError::Playback(err.to_string())
    }
}

impl From<rodio::decoder::DecoderError> for VoiceError {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        VoiceError::Playback(format!("Decode failed: {}", err))
    }
}
