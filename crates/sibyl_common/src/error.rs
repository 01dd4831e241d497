//! Pipeline error taxonomy.
//!
//! Two failure classes exist and they never mix:
//! - file-local errors (retrieval, filter, score) are absorbed at the stage
//!   that produced them and degrade only that file's result;
//! - run-fatal errors (selection, generation) propagate unchanged through the
//!   orchestrator to the host.
//!
//! Cancellation is user-initiated, not a bug, and gets its own variant so the
//! host can show a neutral "cancelled" message instead of an error dialog.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file-selection LLM call failed or returned an unparseable
    /// structure. Fatal: without selection, downstream stages have nothing
    /// to retrieve.
    #[error("file selection failed: {message}")]
    Selection { message: String },

    /// A single file could not be read. File-local: log and omit.
    #[error("failed to read {file_path}: {message}")]
    Retrieval { file_path: String, message: String },

    /// The filtering pass failed for a single file. File-local: that file's
    /// content degrades to the empty string.
    #[error("content filtering failed for {file_path}: {message}")]
    Filter { file_path: String, message: String },

    /// The scoring pass failed for a single file. File-local: that file is
    /// excluded from the result list.
    #[error("relevance scoring failed for {file_path}: {message}")]
    Score { file_path: String, message: String },

    /// The main answer stream failed. Fatal: no partial answer is committed
    /// to the conversation history.
    #[error("answer generation failed: {message}")]
    Generation { message: String },

    /// The user cancelled the run.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration was rejected at construction time.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// A transport-level LLM failure, before any stage-specific meaning is
    /// attached to it.
    #[error("LLM request failed: {message}")]
    Llm { message: String },
}

impl PipelineError {
    pub fn selection(err: impl std::fmt::Display) -> Self {
        Self::Selection { message: err.to_string() }
    }

    pub fn retrieval(file_path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Retrieval { file_path: file_path.into(), message: err.to_string() }
    }

    pub fn filter(file_path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Filter { file_path: file_path.into(), message: err.to_string() }
    }

    pub fn score(file_path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Score { file_path: file_path.into(), message: err.to_string() }
    }

    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation { message: err.to_string() }
    }

    pub fn config(err: impl std::fmt::Display) -> Self {
        Self::Config { message: err.to_string() }
    }

    pub fn llm(err: impl std::fmt::Display) -> Self {
        Self::Llm { message: err.to_string() }
    }

    /// Whether this error aborts the whole pipeline run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Selection { .. } | Self::Generation { .. } | Self::Config { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The file this error is scoped to, if it is file-local.
    pub fn file_path(&self) -> Option<&str> {
        match self {
            Self::Retrieval { file_path, .. }
            | Self::Filter { file_path, .. }
            | Self::Score { file_path, .. } => Some(file_path),
            _ => None,
        }
    }
}
