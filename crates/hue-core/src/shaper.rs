//! **Response Shaper**: keeps spoken replies short.
//!
//! Replies longer than `max_words` are cut, preferring to end on a sentence
//! boundary found within the last few words before the cut. The user can opt
//! out by saying the explain keyword.

use crate::violations::ViolationLog;
use tracing::info;

const ELLIPSIS: &str = "...";

/// Brevity policy applied to every reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapePolicy {
    /// Maximum words in a reply (default 10).
    pub max_words: usize,
    /// Lowercased keyword that lifts the limit (default "explain").
    pub explain_keyword: String,
    /// How far back from the cut to look for a sentence end (default 5).
    pub boundary_window: usize,
}

impl Default for ShapePolicy {
    fn default() -> Self {
        Self {
            max_words: 10,
            explain_keyword: "explain".to_string(),
            boundary_window: 5,
        }
    }
}

/// Applies a [`ShapePolicy`] and records each truncation.
#[derive(Debug, Clone)]
pub struct ResponseShaper {
    policy: ShapePolicy,
    violations: ViolationLog,
}

impl ResponseShaper {
    pub fn new(mut policy: ShapePolicy, violations: ViolationLog) -> Self {
        policy.explain_keyword = policy.explain_keyword.to_lowercase();
        Self { policy, violations }
    }

    pub fn policy(&self) -> &ShapePolicy {
        &self.policy
    }

    /// Whether `input` asks for a full-length answer.
    pub fn wants_explanation(&self, input: &str) -> bool {
        !self.policy.explain_keyword.is_empty()
            && input.to_lowercase().contains(&self.policy.explain_keyword)
    }

    /// Shape `reply` for the turn triggered by `input`.
    pub fn shape(&self, reply: &str, input: &str) -> String {
        if self.wants_explanation(input) {
            info!("'{}' keyword detected, allowing full response", self.policy.explain_keyword);
            return reply.to_string();
        }

        let words: Vec<&str> = reply.split_whitespace().collect();
        let max = self.policy.max_words;
        if words.len() <= max {
            return reply.to_string();
        }

        let mut end = max;
        // Lower bound is exclusive: with max=10 and window=5 indices 9..=6 are scanned.
        let floor = max.saturating_sub(self.policy.boundary_window);
        for i in (floor + 1..max).rev() {
            if ends_sentence(words[i]) {
                end = i + 1;
                info!("Truncated at sentence boundary: {} words", end);
                break;
            }
        }

        let kept = &words[..end];
        let mut shaped = kept.join(" ");
        let overflow = kept.len() > max;
        let open_ended = kept.last().map_or(true, |w| !ends_sentence(w));
        if overflow || open_ended {
            shaped.push_str(ELLIPSIS);
        }

        let final_count = shaped.split_whitespace().count();
        info!("Truncated response from {} to {} words", words.len(), final_count);
        self.violations.record(format!(
            "Response truncated: {} words -> {} words",
            words.len(),
            final_count
        ));
        shaped
    }
}

fn ends_sentence(word: &str) -> bool {
    matches!(word.chars().last(), Some('.' | '!' | '?'))
}
