//! Core data models shared by the index, the tracker, and the matcher.
//!
//! These types represent the knowledge entries, session state, and match
//! results that flow through a single question/answer turn.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named subset of the knowledge base (e.g. `GENERAL`, `GOLDCARD`).
///
/// The set of partitions is declared in configuration and closed once
/// the index has been loaded. Names are compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(String);

impl Partition {
    /// Name of the partition every session starts in.
    pub const GENERAL: &'static str = "GENERAL";
    /// Name of the gold card partition triggered by the default rule.
    pub const GOLDCARD: &'static str = "GOLDCARD";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn general() -> Self {
        Self::new(Self::GENERAL)
    }

    pub fn goldcard() -> Self {
        Self::new(Self::GOLDCARD)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::general()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Partition {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One question/answer pair with the embedding of its question.
///
/// Immutable once stored in an [`EmbeddingIndex`](crate::index::EmbeddingIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
}

/// Per-conversation state consulted and updated once per turn.
///
/// Owned by the conversation-state store; the core only borrows it
/// mutably for the duration of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// When the previous message of this conversation was received.
    pub last_activity: Option<DateTime<Utc>>,
    /// Partition the next question will be matched against.
    pub active_context: Partition,
    /// Channel the conversation arrived on (e.g. `"slack"`), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Bot identity the conversation is addressed to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
}

impl SessionState {
    /// Fresh session in the given partition with no recorded activity.
    pub fn new(default_context: Partition) -> Self {
        Self {
            last_activity: None,
            active_context: default_context,
            channel_id: None,
            recipient_id: None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(Partition::general())
    }
}

/// Outcome of one matched question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    /// Answer to show the user (the fallback text when `is_fallback`).
    pub answer: String,
    /// Closest stored question, reported even for fallbacks.
    pub matched_question: String,
    /// Similarity between the query and `matched_question`. With the
    /// default cosine this lies in `[-1, 1]`; negative means the texts
    /// point in opposite directions and always falls back under a
    /// non-negative threshold.
    pub score: f32,
    /// Partition the question was matched against.
    pub context: Partition,
    /// True when the score fell below the unknown-answer threshold.
    pub is_fallback: bool,
}
