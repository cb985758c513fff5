//! Per-utterance speech session shared by the player and the interruption monitor.
//!
//! Both flags live in one atomic word so "interrupted implies speaking" holds
//! without a lock: the interrupt bit can only be set by a compare-and-swap that
//! observes the speaking bit, and it is never cleared.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const SPEAKING: u8 = 0b01;
const INTERRUPTED: u8 = 0b10;

/// State of one spoken reply. Never reused across replies.
#[derive(Debug)]
pub struct SpeechSession {
    id: u64,
    state: AtomicU8,
}

impl SpeechSession {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mark the session as speaking. The returned guard clears the flag on drop.
    pub fn begin(self: &Arc<Self>) -> SpeakingGuard {
        self.state.fetch_or(SPEAKING, Ordering::SeqCst);
        SpeakingGuard {
            session: Arc::clone(self),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.load(Ordering::SeqCst) & SPEAKING != 0
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.load(Ordering::SeqCst) & INTERRUPTED != 0
    }

    /// Set the interrupt bit. Returns `true` only for the call that set it, and
    /// only while the session is speaking.
    pub fn mark_interrupted(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s & SPEAKING != 0 && s & INTERRUPTED == 0).then_some(s | INTERRUPTED)
            })
            .is_ok()
    }

    fn finish(&self) {
        self.state.fetch_and(!SPEAKING, Ordering::SeqCst);
    }
}

/// Clears `speaking` when dropped, including on panic unwind.
#[derive(Debug)]
pub struct SpeakingGuard {
    session: Arc<SpeechSession>,
}

impl SpeakingGuard {
    pub fn session(&self) -> &Arc<SpeechSession> {
        &self.session
    }
}

impl Drop for SpeakingGuard {
    fn drop(&mut self) {
        self.session.finish();
    }
}
