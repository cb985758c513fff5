//! Voice chat demo: full loop with the production adapters.
//!
//! Needs a microphone plus `GROK_API_KEY`, `SERPAPI_KEY` and `STT_API_KEY`
//! (or `OPENAI_API_KEY`) in the environment or `.env`. `ELEVENLABS_API_KEY`
//! is optional; without it replies are spoken with the system command.
//!
//! Say "goodbye" (or any configured exit phrase) to stop. `RUST_LOG=debug`
//! shows per-chunk and per-model detail.

use hue_core::HueConfig;
use hue_voice::{run_voice_chat, ChatLoopOptions, Collaborators, TurnController};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = HueConfig::load()?.with_env_secrets();
    let collaborators = Collaborators::from_config(&config)?;
    let listener = collaborators.phrase_source.clone();
    let recognizer = collaborators.recognizer.clone();
    let controller = TurnController::new(&config, collaborators)?;

    info!("🎤 Hue voice chat. Press Ctrl+C to stop.");
    let options = ChatLoopOptions::from_config(&config);

    tokio::select! {
        result = run_voice_chat(&controller, listener.as_ref(), recognizer.as_ref(), &options) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Voice chat interrupted by user");
            controller.stop_listening();
        }
    }

    let violations = controller.violations();
    if !violations.is_empty() {
        info!("{} violation(s) this session:", violations.len());
        for v in violations {
            info!("  [{}] {}", v.timestamp.format("%H:%M:%S"), v.message);
        }
    }
    Ok(())
}
