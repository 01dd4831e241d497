//! Chat model abstraction.
//!
//! Provides a generic interface for calling LLM backends: free-text
//! streaming for answer generation and content filtering, and strict-JSON
//! generation for the structured stages (selection, scoring, assessment).
//! Supports both a real HTTP implementation and a fake client for testing.

pub mod http;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;

use sibyl_common::{ConversationMessage, PipelineConfig, PipelineError};

pub use http::{HttpChatClient, LlmEndpointConfig};

/// Stream of answer text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, PipelineError>> + Send>>;

/// One chat model call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl ChatRequest {
    /// Build a request with sampling knobs taken from the pipeline config.
    pub fn new(
        system: Option<String>,
        messages: Vec<ConversationMessage>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            system,
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// Generic chat model client.
///
/// Any error from these calls is the failure unit of the stage that made the
/// call: fatal for selection and generation, file-local for filter and score.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stream a free-text completion chunk by chunk.
    async fn stream_text(&self, request: ChatRequest) -> Result<TextStream, PipelineError>;

    /// Request a completion constrained to a single JSON object.
    async fn generate_json(&self, request: ChatRequest) -> Result<serde_json::Value, PipelineError>;
}

/// Typed wrapper over [`ChatModel::generate_json`]: the declared Rust type is
/// the schema, and a response that does not match it is an LLM error.
pub async fn generate_object<T: DeserializeOwned>(
    model: &dyn ChatModel,
    request: ChatRequest,
) -> Result<T, PipelineError> {
    let value = model.generate_json(request).await?;
    serde_json::from_value(value)
        .map_err(|e| PipelineError::llm(format!("response does not match expected schema: {}", e)))
}

// ============================================================================
// Fake client for testing
// ============================================================================

enum ScriptedJson {
    Ok(serde_json::Value),
    Err(String),
}

enum ScriptedStream {
    Ok(Vec<String>),
    Err(String),
    /// Chunks delivered before the stream yields an error.
    FailAfter(Vec<String>, String),
}

/// Fake chat model with scripted responses, for tests and host development.
///
/// JSON and stream responses are consumed in FIFO order; when a queue holds a
/// single entry it is repeated rather than consumed. Every request is
/// recorded for later assertions.
#[derive(Default)]
pub struct FakeChatModel {
    json_responses: Mutex<VecDeque<ScriptedJson>>,
    stream_responses: Mutex<VecDeque<ScriptedStream>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.json_responses.lock().unwrap().push_back(ScriptedJson::Ok(value));
    }

    pub fn push_json_error(&self, message: impl Into<String>) {
        self.json_responses.lock().unwrap().push_back(ScriptedJson::Err(message.into()));
    }

    pub fn push_stream(&self, chunks: Vec<&str>) {
        self.stream_responses
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Ok(chunks.into_iter().map(String::from).collect()));
    }

    pub fn push_stream_error(&self, message: impl Into<String>) {
        self.stream_responses.lock().unwrap().push_back(ScriptedStream::Err(message.into()));
    }

    pub fn push_stream_failing_after(&self, chunks: Vec<&str>, message: impl Into<String>) {
        self.stream_responses.lock().unwrap().push_back(ScriptedStream::FailAfter(
            chunks.into_iter().map(String::from).collect(),
            message.into(),
        ));
    }

    /// Total calls made, both JSON and streaming.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The requests seen so far, for prompt-content assertions.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ChatRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    async fn stream_text(&self, request: ChatRequest) -> Result<TextStream, PipelineError> {
        self.record(&request);
        let mut queue = self.stream_responses.lock().unwrap();
        let scripted = if queue.len() == 1 {
            match queue.front().unwrap() {
                ScriptedStream::Ok(chunks) => ScriptedStream::Ok(chunks.clone()),
                ScriptedStream::Err(e) => ScriptedStream::Err(e.clone()),
                ScriptedStream::FailAfter(chunks, e) => {
                    ScriptedStream::FailAfter(chunks.clone(), e.clone())
                }
            }
        } else {
            queue
                .pop_front()
                .ok_or_else(|| PipelineError::llm("fake model has no scripted stream response"))?
        };
        match scripted {
            ScriptedStream::Ok(chunks) => {
                Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
            }
            ScriptedStream::Err(message) => Err(PipelineError::llm(message)),
            ScriptedStream::FailAfter(chunks, message) => {
                let items: Vec<Result<String, PipelineError>> = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(PipelineError::llm(message))))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
        }
    }

    async fn generate_json(&self, request: ChatRequest) -> Result<serde_json::Value, PipelineError> {
        self.record(&request);
        let mut queue = self.json_responses.lock().unwrap();
        let scripted = if queue.len() == 1 {
            match queue.front().unwrap() {
                ScriptedJson::Ok(v) => ScriptedJson::Ok(v.clone()),
                ScriptedJson::Err(e) => ScriptedJson::Err(e.clone()),
            }
        } else {
            queue
                .pop_front()
                .ok_or_else(|| PipelineError::llm("fake model has no scripted JSON response"))?
        };
        match scripted {
            ScriptedJson::Ok(value) => Ok(value),
            ScriptedJson::Err(message) => Err(PipelineError::llm(message)),
        }
    }
}
