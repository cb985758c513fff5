//! **Speech-to-Text**: turn a [`HeardPhrase`] into text.
//!
//! The recognizer distinguishes "audio was there but nothing intelligible"
//! ([`Recognition::NoMatch`]) from a service failure (`Err`). The interruption
//! monitor treats both as an interruption; the voice loop skips them.

use crate::audio::HeardPhrase;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Outcome of a successful recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    Text(String),
    /// Audio present but no words recognized.
    NoMatch,
}

impl Recognition {
    /// Recognized text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Recognition::Text(t) => Some(t),
            Recognition::NoMatch => None,
        }
    }
}

/// Speech-recognition collaborator.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, phrase: &HeardPhrase) -> VoiceResult<Recognition>;
}

/// Encode f32 PCM (mono) to 16-bit WAV bytes for API upload.
pub(crate) fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32; // 16-bit = 2 bytes per sample
    let mut buf = Vec::with_capacity(44 + data_len as usize);
    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    // fmt subchunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    // data subchunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// OpenAI-compatible transcription API (`/audio/transcriptions`, Whisper models).
#[derive(Debug, Clone)]
pub struct WhisperApiRecognizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl WhisperApiRecognizer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperApiRecognizer {
    async fn recognize(&self, phrase: &HeardPhrase) -> VoiceResult<Recognition> {
        if phrase.samples.is_empty() {
            return Ok(Recognition::NoMatch);
        }
        if hue_core::is_placeholder_key(&self.api_key) {
            return Err(VoiceError::Stt("STT_API_KEY is not set".to_string()));
        }

        let wav = pcm_f32_to_wav(&phrase.samples, phrase.sample_rate);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", "en");

        let res = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }

        let json: serde_json::Value = res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        debug!("Recognized {} chars", text.len());
        if text.is_empty() {
            Ok(Recognition::NoMatch)
        } else {
            Ok(Recognition::Text(text))
        }
    }
}
