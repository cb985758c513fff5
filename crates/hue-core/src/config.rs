//! Hue configuration: defaults, optional TOML file, `HUE__*` environment.
//!
//! | Source | Example |
//! |--------|---------|
//! | built-in defaults | `HueConfig::default()` |
//! | TOML file at `HUE_CONFIG` (default `config/hue.toml`) | `max_response_words = 20` |
//! | environment, `HUE__` prefix | `HUE__SILENCE_TIMEOUT_SECS=1.5` |
//!
//! API keys are never read from the file. They come from the usual variables
//! (`GROK_API_KEY`, `SERPAPI_KEY`, `ELEVENLABS_API_KEY`, `STT_API_KEY`) through
//! [`HueConfig::with_env_secrets`]; placeholder values count as unset.

use crate::completion::{DEFAULT_MODELS, XAI_API_BASE};
use crate::error::{ErrorKind, HueError, HueResult};
use crate::shaper::ShapePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const PLACEHOLDER_MARKERS: &[&str] = &["your-", "placeholder", "example"];

/// Which speech sink speaks replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsBackendKind {
    /// Remote synthesis service (ElevenLabs), falling back to the system command on error.
    #[default]
    Service,
    /// Local command such as macOS `say`.
    System,
}

/// Every recognized option. Missing keys take the [`Default`] value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HueConfig {
    /// Seconds to wait before answering (silence gate).
    pub silence_timeout_secs: f64,
    /// Reply word limit unless the explain keyword is used.
    pub max_response_words: usize,
    pub explain_keyword: String,
    /// Words looked back from the cut for a sentence end.
    pub boundary_window: usize,
    /// Completion models, tried in order.
    pub models: Vec<String>,
    pub completion_url: String,
    pub completion_timeout_secs: u64,
    pub search_url: String,
    pub search_timeout_secs: u64,
    pub tts_backend: TtsBackendKind,
    /// Voice selector for the service backend.
    pub voice_id: String,
    pub tts_url: String,
    pub tts_model: String,
    /// Program run by the system backend, one process per chunk.
    pub system_tts_command: String,
    pub stt_url: String,
    pub stt_model: String,
    /// Words per synthesized chunk.
    pub chunk_words: usize,
    /// How often playback checks for an interruption.
    pub poll_interval_ms: u64,
    /// Per-chunk safety ceiling.
    pub chunk_ceiling_secs: f64,
    /// Pause between starting the monitor and the first chunk.
    pub monitor_warmup_ms: u64,
    /// Voice loop: how long to wait for the user to start talking.
    pub listen_timeout_secs: f64,
    pub exit_phrases: Vec<String>,

    #[serde(skip_serializing)]
    pub grok_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub serpapi_key: Option<String>,
    #[serde(skip_serializing)]
    pub elevenlabs_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub stt_api_key: Option<String>,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self {
            silence_timeout_secs: 2.0,
            max_response_words: 10,
            explain_keyword: "explain".to_string(),
            boundary_window: 5,
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            completion_url: XAI_API_BASE.to_string(),
            completion_timeout_secs: 30,
            search_url: "https://serpapi.com".to_string(),
            search_timeout_secs: 10,
            tts_backend: TtsBackendKind::Service,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            tts_url: "https://api.elevenlabs.io".to_string(),
            tts_model: "eleven_monolingual_v1".to_string(),
            system_tts_command: "say".to_string(),
            stt_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            chunk_words: 5,
            poll_interval_ms: 100,
            chunk_ceiling_secs: 3.0,
            monitor_warmup_ms: 200,
            listen_timeout_secs: 5.0,
            exit_phrases: ["exit", "goodbye", "quit", "stop", "end"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            grok_api_key: None,
            serpapi_key: None,
            elevenlabs_api_key: None,
            stt_api_key: None,
        }
    }
}

impl HueConfig {
    /// Load config from file and environment. Precedence: env `HUE__*` > file at
    /// `HUE_CONFIG` (or `config/hue.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("HUE_CONFIG").unwrap_or_else(|_| "config/hue.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    /// Same as [`load`](Self::load) with an explicit file path (missing file is fine).
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };
        builder
            .add_source(
                config::Environment::with_prefix("HUE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("models")
                    .with_list_parse_key("exit_phrases"),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Fill API keys from the conventional environment variables.
    pub fn with_env_secrets(mut self) -> Self {
        self.grok_api_key = self.grok_api_key.or_else(|| env_secret("GROK_API_KEY"));
        self.serpapi_key = self.serpapi_key.or_else(|| env_secret("SERPAPI_KEY"));
        self.elevenlabs_api_key = self
            .elevenlabs_api_key
            .or_else(|| env_secret("ELEVENLABS_API_KEY"));
        self.stt_api_key = self
            .stt_api_key
            .or_else(|| env_secret("STT_API_KEY"))
            .or_else(|| env_secret("OPENAI_API_KEY"));
        self
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> HueResult<()> {
        let invalid = |msg: &str| Err(HueError::new(ErrorKind::InvalidConfig, msg.to_string()));
        if !(self.silence_timeout_secs.is_finite() && self.silence_timeout_secs > 0.0) {
            return invalid("silence_timeout_secs must be a positive number");
        }
        if self.max_response_words == 0 {
            return invalid("max_response_words must be at least 1");
        }
        if self.models.iter().all(|m| m.trim().is_empty()) {
            return invalid("models must name at least one model");
        }
        if self.chunk_words == 0 {
            return invalid("chunk_words must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be at least 1");
        }
        Ok(())
    }

    pub fn shape_policy(&self) -> ShapePolicy {
        ShapePolicy {
            max_words: self.max_response_words,
            explain_keyword: self.explain_keyword.clone(),
            boundary_window: self.boundary_window,
        }
    }

    pub fn silence_timeout(&self) -> Duration {
        secs_f64(self.silence_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn chunk_ceiling(&self) -> Duration {
        secs_f64(self.chunk_ceiling_secs)
    }

    pub fn monitor_warmup(&self) -> Duration {
        Duration::from_millis(self.monitor_warmup_ms)
    }

    pub fn listen_timeout(&self) -> Duration {
        secs_f64(self.listen_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

/// True for empty keys and the template values shipped in sample `.env` files.
pub fn is_placeholder_key(key: &str) -> bool {
    let k = key.trim().to_lowercase();
    k.is_empty() || PLACEHOLDER_MARKERS.iter().any(|m| k.contains(m))
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !is_placeholder_key(s))
}

fn secs_f64(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = HueConfig::default();
        assert_eq!(c.silence_timeout(), Duration::from_secs(2));
        assert_eq!(c.max_response_words, 10);
        assert_eq!(c.explain_keyword, "explain");
        assert_eq!(c.boundary_window, 5);
        assert_eq!(c.models[0], "grok-3");
        assert_eq!(c.models.len(), 5);
        assert_eq!(c.chunk_words, 5);
        assert_eq!(c.tts_backend, TtsBackendKind::Service);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let c = HueConfig::from_toml_str(
            r#"
            max_response_words = 20
            tts_backend = "system"
            models = ["a", "b"]
            "#,
        )
        .unwrap();
        assert_eq!(c.max_response_words, 20);
        assert_eq!(c.tts_backend, TtsBackendKind::System);
        assert_eq!(c.models, vec!["a", "b"]);
        assert_eq!(c.explain_keyword, "explain");
    }

    #[test]
    fn validate_rejects_zero_words_and_empty_models() {
        let mut c = HueConfig::default();
        c.max_response_words = 0;
        assert!(c.validate().is_err());

        let mut c = HueConfig::default();
        c.models = vec![" ".into()];
        assert!(c.validate().is_err());

        let mut c = HueConfig::default();
        c.silence_timeout_secs = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn placeholder_keys_are_detected() {
        assert!(is_placeholder_key(""));
        assert!(is_placeholder_key("your-grok-api-key-here"));
        assert!(is_placeholder_key("PLACEHOLDER"));
        assert!(!is_placeholder_key("xai-abc123"));
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let c = HueConfig::load_from(Path::new("/nonexistent/hue.toml")).unwrap();
        assert_eq!(c.voice_id, "21m00Tcm4TlvDq8ikWAM");
    }
}
