//! Knowledge-enhanced response pipeline.
//!
//! Given a user question, the pipeline asks an LLM which project files are
//! relevant, retrieves and filters their content, scores relevance, streams
//! a generated answer, and reports which sources were used. The host
//! supplies the collaborators at the boundary: a chat model, a project
//! index, a conversation history store, prompt templates, and a
//! progress/cancellation host.
//!
//! Composition-root usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use sibyl_common::{PipelineConfig, DefaultPromptStore};
//! use sibyl_core::{
//!     FileContentStore, HttpChatClient, InMemoryHistory, LlmEndpointConfig,
//!     LogProgress, ResponseOrchestrator,
//! };
//!
//! # async fn run() -> Result<(), sibyl_common::PipelineError> {
//! let config = PipelineConfig::default();
//! let orchestrator = ResponseOrchestrator::new(
//!     Arc::new(HttpChatClient::new(LlmEndpointConfig::default())?),
//!     Arc::new(FileContentStore::new(&config)?),
//!     Arc::new(InMemoryHistory::new()),
//!     Arc::new(DefaultPromptStore),
//!     Arc::new(LogProgress),
//!     config,
//! );
//! let token = CancellationToken::new();
//! let report = orchestrator
//!     .run("What does the parser do?", &|chunk| print!("{}", chunk), &token)
//!     .await?;
//! println!("\nused {} sources", report.used_sources.len());
//! # Ok(())
//! # }
//! ```

pub mod assessor;
pub mod generator;
pub mod history;
pub mod llm;
pub mod orchestrator;
pub mod overview;
pub mod progress;
pub mod reporter;
pub mod retriever;
pub mod selector;
pub mod store;

pub use assessor::AnswerAssessor;
pub use generator::{AnswerGenerator, ChunkSink};
pub use history::{ConversationHistory, InMemoryHistory};
pub use llm::{
    generate_object, ChatModel, ChatRequest, FakeChatModel, HttpChatClient, LlmEndpointConfig,
    TextStream,
};
pub use orchestrator::{PipelineRunReport, PipelineState, ResponseOrchestrator, Stage};
pub use overview::{render_file_list, render_project_overview};
pub use progress::{check_cancelled, LogProgress, NullProgress, ProgressHost};
pub use reporter::{format_used_sources, UsedSourcesReporter};
pub use retriever::ContentRetrieverFilterScorer;
pub use selector::RelevantFileSelector;
pub use store::{FileContentStore, InMemoryProjectIndex, ProjectIndex};
