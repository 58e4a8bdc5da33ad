//! Termination Policy
//!
//! A step ends the session when the assistant's text contains one of a fixed
//! set of completion phrases, matched case-insensitively as substrings. This
//! is a heuristic: the marker inside quoted code, or the bare word "done" in
//! ordinary prose, also ends the loop.

use serde::{Deserialize, Serialize};

/// Marker the model is asked to emit after its last step
pub const DONE_MARKER: &str = "<DONE>";

const DEFAULT_PHRASES: &[&str] = &[
    "<done>",
    "done",
    "there is no next step.",
    "this conversation is complete",
    "the conversation has ended.",
    "this conversation is finished.",
    "the conversation has concluded.",
];

/// Content-based completion detector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationPolicy {
    /// Lowercased phrases
    phrases: Vec<String>,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self::with_phrases(DEFAULT_PHRASES.iter().copied())
    }
}

impl TerminationPolicy {
    /// Policy with a custom phrase set
    pub fn with_phrases<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// Only the literal marker ends the session
    pub fn marker_only() -> Self {
        Self::with_phrases([DONE_MARKER])
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Check whether a reply's text signals completion
    pub fn is_complete(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}
