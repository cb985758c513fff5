//! hue-core: the text side of a Hue turn.
//!
//! Search grounding, chat completion with model fallback, reply shaping,
//! configuration and the shared violation log. Audio lives in `hue-voice`.

pub mod augmenter;
pub mod completion;
pub mod config;
pub mod error;
pub mod shaper;
pub mod violations;

pub use augmenter::{
    build_context, extract_claims, ContextAugmenter, SearchBackend, SearchHit, SearchResults,
    SerpApiSearch, MAX_QUERY_CHARS, MAX_RESULTS,
};
pub use completion::{
    build_messages, ChatMessage, ChatRequest, CompletionClient, CompletionTransport,
    SamplingParams, TransportError, XaiChatTransport, DEFAULT_MODELS, XAI_API_BASE,
};
pub use config::{is_placeholder_key, HueConfig, TtsBackendKind};
pub use error::{ErrorKind, HueError, HueResult};
pub use shaper::{ResponseShaper, ShapePolicy};
pub use violations::{Violation, ViolationLog};
