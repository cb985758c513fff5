//! # Hue Voice - turn taking for a spoken assistant
//!
//! Decides when the assistant may answer, and lets the user cut it off while
//! it talks. Text processing lives in `hue-core`; this crate owns the audio.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Turn Controller                         │
//! │  process_turn:  silence gate → augment → complete → shape     │
//! │                                                               │
//! │  speak:  ┌──────────────┐   SpeechSession   ┌──────────────┐  │
//! │          │ Speech Player│ ◄──(atomic flags)─│  Interruption│  │
//! │          │  (chunks)    │                   │   Monitor    │  │
//! │          └──────┬───────┘                   └──────┬───────┘  │
//! │                 ↓                                  ↑          │
//! │          ┌──────────────┐                   ┌──────────────┐  │
//! │          │ Speech Sink  │                   │ Mic + VAD →  │  │
//! │          │ (rodio/say)  │                   │  recognizer  │  │
//! │          └──────────────┘                   └──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod error;
pub mod monitor;
pub mod player;
pub mod session;
pub mod stt;
pub mod turn;
pub mod vad;
pub mod voice_loop;
pub mod voice_output;

pub use audio::{AudioConfig, HeardPhrase, MicrophoneInput, PhraseSource, PhraseStream};
pub use error::{VoiceError, VoiceResult};
pub use monitor::{InterruptionMonitor, MonitorHandle};
pub use player::{chunk_text, PlaybackReport, PlayerConfig, SpeechPlayer};
pub use session::{SpeakingGuard, SpeechSession};
pub use stt::{Recognition, SpeechRecognizer, WhisperApiRecognizer};
pub use turn::{
    Collaborators, SpeechHandle, SpeechReport, TurnController, TurnOutcome, TurnPhase,
    INTERRUPTED_SENTINEL,
};
pub use vad::{PhraseAccumulator, PhraseDetector, PhraseLimits, VadConfig, VadDetector};
pub use voice_loop::{listen, listen_once, run_voice_chat, ChatLoopOptions};
pub use voice_output::{
    AudioOutput, CommandSpeechSink, ElevenLabsTts, FallbackSpeechSink, Playback,
    ServiceSpeechSink, SpeechSink, TtsBackend,
};
