//! Error kinds for the Hue turn controller.
//!
//! Every failure that can reach a caller is a [`HueError`]: a [`ErrorKind`] tag
//! plus a free-form detail string. The kind drives control decisions (stop vs.
//! degrade); the detail only ever ends up in logs and violation records.

use std::fmt;
use thiserror::Error;

/// Result type alias for controller operations.
pub type HueResult<T> = Result<T, HueError>;

/// Classified failure cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote service could not be reached.
    ConnectionError,
    /// The remote service did not answer in time.
    Timeout,
    /// Credentials were missing or rejected.
    AuthError,
    /// The service answered with a non-success status (or an unusable body).
    RequestError(u16),
    /// Every model in the fallback list reported itself unavailable.
    AllModelsExhausted,
    /// The web-search collaborator failed.
    SearchUnavailable,
    /// No working audio device.
    AudioUnavailable,
    /// New user audio arrived during the silence gate.
    InterruptedBeforeResponse,
    /// A configuration value the controller cannot run with.
    InvalidConfig,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConnectionError => f.write_str("connection error"),
            ErrorKind::Timeout => f.write_str("timeout"),
            ErrorKind::AuthError => f.write_str("authorization error"),
            ErrorKind::RequestError(status) => write!(f, "request error ({status})"),
            ErrorKind::AllModelsExhausted => f.write_str("all models exhausted"),
            ErrorKind::SearchUnavailable => f.write_str("search unavailable"),
            ErrorKind::AudioUnavailable => f.write_str("audio unavailable"),
            ErrorKind::InterruptedBeforeResponse => f.write_str("interrupted before response"),
            ErrorKind::InvalidConfig => f.write_str("invalid configuration"),
        }
    }
}

/// A classified failure with operator-facing detail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct HueError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl HueError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Plain-text message safe to show (or speak) to the user.
    ///
    /// Never includes a stack trace; response bodies are cut to 200 characters.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::ConnectionError => {
                "Error: Cannot connect to the language model service. Check your internet connection."
                    .to_string()
            }
            ErrorKind::Timeout => {
                "Error: The language model request timed out. The service may be slow or unavailable."
                    .to_string()
            }
            ErrorKind::AuthError => format!("Error: {}", self.detail),
            ErrorKind::RequestError(429) => {
                "Error: Rate limit exceeded. Wait a moment and try again.".to_string()
            }
            ErrorKind::RequestError(404) => {
                "Error: The language model endpoint was not found.".to_string()
            }
            ErrorKind::RequestError(status) => format!(
                "Error: The language model service returned {}: {}",
                status,
                clip(&self.detail, 200)
            ),
            ErrorKind::AllModelsExhausted => format!(
                "Error: None of the configured models is available ({}).",
                clip(&self.detail, 200)
            ),
            ErrorKind::SearchUnavailable => "Error: Web search is unavailable.".to_string(),
            ErrorKind::AudioUnavailable => {
                "Error: No working microphone was found. Voice chat needs an audio input device."
                    .to_string()
            }
            ErrorKind::InterruptedBeforeResponse => "Interrupted".to_string(),
            ErrorKind::InvalidConfig => format!("Error: Invalid configuration: {}", self.detail),
        }
    }
}

/// First `max` characters of `s` (character based, never splits a code point).
pub(crate) fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
