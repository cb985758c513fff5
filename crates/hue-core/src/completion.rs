//! **Completion Client**: chat completions with model fallback.
//!
//! The transport talks HTTP and classifies every failure into a
//! [`TransportError`]; the client walks the configured model list and decides,
//! per error variant, whether the next model is worth trying. Only "this model
//! is unavailable" moves on. Connectivity, auth, rate-limit and generic status
//! failures end the request immediately.
//!
//! API key: `GROK_API_KEY`. Default endpoint: `https://api.x.ai/v1`.

use crate::error::{clip, ErrorKind, HueError, HueResult};
use crate::violations::ViolationLog;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub const XAI_API_BASE: &str = "https://api.x.ai/v1";

/// Models tried in order when none are configured explicitly.
pub const DEFAULT_MODELS: &[&str] = &["grok-3", "grok-beta", "grok-2", "grok-vision-beta", "grok"];

const SYSTEM_PROMPT: &str = "You are Hue, a spoken voice assistant. \
Give accurate, well-reasoned answers in a natural conversational tone. \
When web search context is provided, use it for current facts and weave it into the answer. \
If you are unsure about something, say so instead of guessing.";

const CONTEXT_OPEN: &str = "=== Web Search Context ===";
const CONTEXT_CLOSE: &str = "=== End of Web Search Context ===";

/// Fixed sampling parameters; never taken from user input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// OpenAI-compatible request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

/// Failure reported by a [`CompletionTransport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("model unavailable ({status}): {body}")]
    ModelUnavailable { status: u16, body: String },

    #[error("unauthorized ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("rate limited: {body}")]
    RateLimited { body: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unusable response ({status}): {detail}")]
    InvalidResponse { status: u16, detail: String },
}

impl TransportError {
    /// Classify a non-success HTTP answer.
    pub fn from_status(status: u16, body: String) -> Self {
        let lower = body.to_lowercase();
        if status == 401 || status == 403 {
            return Self::Unauthorized { status, body };
        }
        if status == 429 {
            return Self::RateLimited { body };
        }
        if (400..500).contains(&status) && is_model_unavailable(&lower) {
            return Self::ModelUnavailable { status, body };
        }
        if status == 400 && (lower.contains("api key") || lower.contains("unauthorized")) {
            return Self::Unauthorized { status, body };
        }
        Self::Status { status, body }
    }
}

fn is_model_unavailable(lower_body: &str) -> bool {
    lower_body.contains("model")
        && (lower_body.contains("invalid") || lower_body.contains("not found"))
}

/// Language-model collaborator: one request, one reply.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<String, TransportError>;
}

/// Build the system + user messages for a turn.
pub fn build_messages(input: &str, context: Option<&str>) -> Vec<ChatMessage> {
    let system = match context {
        Some(ctx) => format!(
            "{SYSTEM_PROMPT}\n\n{CONTEXT_OPEN}\n{ctx}\n{CONTEXT_CLOSE}\n\n\
             Use this context to give an accurate answer."
        ),
        None => SYSTEM_PROMPT.to_string(),
    };
    vec![ChatMessage::system(system), ChatMessage::user(input)]
}

/// Walks the model list against a [`CompletionTransport`].
pub struct CompletionClient {
    transport: Arc<dyn CompletionTransport>,
    models: Vec<String>,
    sampling: SamplingParams,
    violations: ViolationLog,
}

impl CompletionClient {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        models: Vec<String>,
        violations: ViolationLog,
    ) -> Self {
        Self {
            transport,
            models,
            sampling: SamplingParams::default(),
            violations,
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Ask the model list for a reply. Every `Err` has already been recorded
    /// as exactly one violation.
    pub async fn complete(&self, input: &str, context: Option<&str>) -> HueResult<String> {
        let result = self.try_models(input, context).await;
        if let Err(e) = &result {
            error!("Completion failed: {}", e);
            self.violations.record(format!("Completion failed: {e}"));
        }
        result
    }

    async fn try_models(&self, input: &str, context: Option<&str>) -> HueResult<String> {
        let messages = build_messages(input, context);
        debug!(
            messages = messages.len(),
            context = context.is_some(),
            "sending chat completion request"
        );

        let mut last: Option<String> = None;
        for model in &self.models {
            let request = ChatRequest {
                model: model.clone(),
                messages: messages.clone(),
                sampling: self.sampling,
            };
            match self.transport.send(&request).await {
                Ok(reply) => {
                    info!("Successfully using model: {}", model);
                    return Ok(reply);
                }
                Err(TransportError::ModelUnavailable { status, body }) => {
                    debug!("Model {} not available, trying next...", model);
                    last = Some(format!("{model}: {status} {}", clip(&body, 200)));
                }
                Err(TransportError::Connect(detail)) => {
                    return Err(HueError::new(ErrorKind::ConnectionError, detail));
                }
                Err(TransportError::Timeout(detail)) => {
                    return Err(HueError::new(ErrorKind::Timeout, detail));
                }
                Err(TransportError::Unauthorized { status, body }) => {
                    // status 0: rejected locally before any request was made
                    let detail = if status == 0 {
                        body
                    } else {
                        format!("Invalid API key ({status}): {}", clip(&body, 200))
                    };
                    return Err(HueError::new(ErrorKind::AuthError, detail));
                }
                Err(TransportError::RateLimited { body }) => {
                    return Err(HueError::new(ErrorKind::RequestError(429), body));
                }
                Err(TransportError::Status { status, body }) => {
                    return Err(HueError::new(ErrorKind::RequestError(status), body));
                }
                Err(TransportError::InvalidResponse { status, detail }) => {
                    return Err(HueError::new(ErrorKind::RequestError(status), detail));
                }
            }
        }

        Err(HueError::new(
            ErrorKind::AllModelsExhausted,
            last.unwrap_or_else(|| "no models configured".to_string()),
        ))
    }
}

// ---------------------------------------------------------------------------
// xAI (OpenAI-compatible) transport
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions over HTTP with bearer auth.
pub struct XaiChatTransport {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl XaiChatTransport {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> HueResult<Self> {
        Self::with_base_url(XAI_API_BASE, api_key, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> HueResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                HueError::new(ErrorKind::ConnectionError, format!("HTTP client setup failed: {e}"))
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into().trim().to_string(),
            client,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionTransport for XaiChatTransport {
    async fn send(&self, request: &ChatRequest) -> Result<String, TransportError> {
        if crate::config::is_placeholder_key(&self.api_key) {
            return Err(TransportError::Unauthorized {
                status: 0,
                body: "GROK_API_KEY is not set. Add your key from https://console.x.ai".to_string(),
            });
        }

        let res = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = res.json().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::InvalidResponse {
                    status: status.as_u16(),
                    detail: format!("response parse failed: {e}"),
                }
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TransportError::InvalidResponse {
                status: status.as_u16(),
                detail: "no reply content in response".to_string(),
            })
    }
}
