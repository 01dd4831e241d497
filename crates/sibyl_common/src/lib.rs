//! Shared types for the sibyl knowledge-enhanced response pipeline.
//!
//! This crate holds everything the pipeline and its host both need to see:
//! the data model threaded through the stages, the error taxonomy, the
//! configuration surface, and the prompt templates. It deliberately contains
//! no async code and no I/O beyond loading a config file.

pub mod config;
pub mod error;
pub mod prompts;
pub mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use prompts::{render_template, DefaultPromptStore, PromptId, PromptStore};
pub use types::{
    CandidateFile, ConversationMessage, FilteredContent, RetrievedContent, Role, ScoredContent,
};
