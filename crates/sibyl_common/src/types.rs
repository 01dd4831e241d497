//! Data model threaded through the pipeline stages.
//!
//! The LLM-facing structures serialize with camelCase field names because the
//! prompts describe their JSON schemas in that convention; keeping the serde
//! rename here means the prompt text and the parser can never drift apart.

use serde::{Deserialize, Serialize};

/// Highest score the relevance scale allows.
pub const MAX_RELEVANCE_SCORE: u8 = 10;

/// Who authored a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of the conversation. Ordered, append-only during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A file the selection stage proposed as relevant to the question.
///
/// Invariant: `file_path` must be a member of the available-files list. The
/// selector validates this and drops violators with a warning; nothing past
/// the selector ever sees a path the project index does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFile {
    pub file_path: String,
    /// Why the selector believes this file matters for the question.
    pub initial_reason: String,
    /// Symbol names the selector associated with the file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<String>>,
}

/// Raw file content tagged with the selection reason.
///
/// Created at most once per unique path per pipeline run; the orchestrator
/// keeps a retrieved-path set so retry rounds never re-read the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContent {
    pub file_path: String,
    pub content: String,
    pub initial_reason: String,
}

/// Content after the LLM filtering pass stripped irrelevant portions.
///
/// `content` is the empty string when filtering failed for this file; it is
/// never absent, so downstream stages treat "no usable content" uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredContent {
    pub file_path: String,
    pub content: String,
    pub initial_reason: String,
}

impl FilteredContent {
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Filtered content with a relevance judgment attached.
///
/// Only entries at or above the configured score threshold survive into the
/// final answer prompt. The cutoff is a hard filter applied before the
/// descending-score sort, not a soft ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredContent {
    pub file_path: String,
    pub content: String,
    pub initial_reason: String,
    /// Justification the scoring model gave for its score.
    pub final_reason: String,
    /// Relevance on the 0-10 scale.
    pub score: u8,
}

/// Clamp a model-reported score onto the 0-10 integer scale.
///
/// Models asked for "a number from 0 to 10" occasionally return floats or
/// out-of-range values; accept them and normalize rather than failing the
/// file.
pub fn clamp_score(raw: f64) -> u8 {
    raw.round().clamp(0.0, MAX_RELEVANCE_SCORE as f64) as u8
}
