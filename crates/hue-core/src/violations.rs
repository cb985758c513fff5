//! Append-only violation log.
//!
//! A violation is anything the operator should be able to audit later: a
//! truncated reply, a failed search, an interrupted utterance. The log is owned
//! by the controller and handed to each component as a cheap clone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Shared, ordered, append-only list of [`Violation`]s.
#[derive(Debug, Clone, Default)]
pub struct ViolationLog {
    entries: Arc<Mutex<Vec<Violation>>>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a violation and mirror it to the `hue::violations` tracing target.
    pub fn record(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(target: "hue::violations", "VIOLATION: {}", message);
        self.lock().push(Violation {
            timestamp: Utc::now(),
            message,
        });
    }

    /// Snapshot of all violations in insertion order.
    pub fn snapshot(&self) -> Vec<Violation> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Operator action: drop every record.
    pub fn clear(&self) {
        self.lock().clear();
        tracing::info!("Violations log cleared");
    }

    // A panic while holding the lock leaves a Vec that is still valid to read.
    fn lock(&self) -> MutexGuard<'_, Vec<Violation>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
