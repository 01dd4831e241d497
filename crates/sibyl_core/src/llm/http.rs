//! HTTP chat model client.
//!
//! Speaks two wire dialects, sniffed from the endpoint the way the blocking
//! clients before it did: Ollama (`/api/chat`, NDJSON streaming, `format:
//! "json"` for structured calls) and OpenAI-compatible (`/v1/chat/completions`,
//! SSE `data:` lines, `response_format: json_object`). Every request carries
//! an explicit timeout; a hung provider fails the call instead of stalling
//! the pipeline.

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use sibyl_common::PipelineError;

use super::{ChatModel, ChatRequest, TextStream};
use async_trait::async_trait;

/// Connection settings for one LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpointConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

/// Real chat model over HTTP.
pub struct HttpChatClient {
    config: LlmEndpointConfig,
    client: reqwest::Client,
}

#[derive(Clone, Copy)]
enum WireFormat {
    OllamaNdjson,
    OpenAiSse,
}

enum LineEvent {
    Chunk(String),
    Done,
    Skip,
    Error(String),
}

impl HttpChatClient {
    pub fn new(config: LlmEndpointConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn is_ollama_endpoint(&self) -> bool {
        self.config.endpoint.contains("11434") || self.config.endpoint.contains("ollama")
    }

    fn wire_messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            messages.push(serde_json::json!({
                "role": message.role.as_str(),
                "content": message.content,
            }));
        }
        messages
    }

    fn map_transport_error(&self, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::llm(format!(
                "request timed out after {}s",
                self.config.timeout_secs
            ))
        } else {
            PipelineError::llm(format!("request failed: {}", err))
        }
    }

    async fn send(
        &self,
        url: &str,
        body: Value,
    ) -> Result<reqwest::Response, PipelineError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }
        let response = request.send().await.map_err(|e| self.map_transport_error(e))?;
        if !response.status().is_success() {
            return Err(PipelineError::llm(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for HttpChatClient {
    async fn stream_text(&self, request: ChatRequest) -> Result<TextStream, PipelineError> {
        let messages = self.wire_messages(&request);
        let (url, body, format) = if self.is_ollama_endpoint() {
            (
                format!("{}/api/chat", self.config.endpoint),
                serde_json::json!({
                    "model": self.config.model,
                    "messages": messages,
                    "stream": true,
                    "options": {
                        "temperature": request.temperature,
                        "top_p": request.top_p,
                        "num_predict": request.max_tokens,
                    },
                }),
                WireFormat::OllamaNdjson,
            )
        } else {
            (
                format!("{}/v1/chat/completions", self.config.endpoint),
                serde_json::json!({
                    "model": self.config.model,
                    "messages": messages,
                    "stream": true,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                }),
                WireFormat::OpenAiSse,
            )
        };
        debug!(url = %url, "starting streaming completion");
        let response = self.send(&url, body).await?;
        Ok(line_stream(
            response.bytes_stream(),
            format,
            self.config.timeout_secs,
        ))
    }

    async fn generate_json(&self, request: ChatRequest) -> Result<Value, PipelineError> {
        let messages = self.wire_messages(&request);
        let (url, body) = if self.is_ollama_endpoint() {
            (
                format!("{}/api/chat", self.config.endpoint),
                serde_json::json!({
                    "model": self.config.model,
                    "messages": messages,
                    "stream": false,
                    "format": "json",
                    "options": {
                        "temperature": request.temperature,
                        "top_p": request.top_p,
                        "num_predict": request.max_tokens,
                    },
                }),
            )
        } else {
            (
                format!("{}/v1/chat/completions", self.config.endpoint),
                serde_json::json!({
                    "model": self.config.model,
                    "messages": messages,
                    "stream": false,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "top_p": request.top_p,
                    "response_format": {"type": "json_object"},
                }),
            )
        };
        debug!(url = %url, "requesting structured completion");
        let response = self.send(&url, body).await?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::llm(format!("failed to parse response body: {}", e)))?;

        let text = if self.is_ollama_endpoint() {
            payload
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        } else {
            payload
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
        }
        .ok_or_else(|| PipelineError::llm("backend returned an empty completion"))?;

        parse_json_payload(text)
    }
}

/// Extract a JSON object from model output, tolerating the usual variations:
/// markdown fences, leading prose, trailing commentary.
fn parse_json_payload(text: &str) -> Result<Value, PipelineError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    if let Ok(value) = serde_json::from_str(unfenced) {
        return Ok(value);
    }

    // Last resort: the outermost brace span.
    if let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&unfenced[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(PipelineError::llm(format!(
        "model output is not valid JSON: {:.200}",
        unfenced
    )))
}

fn parse_stream_line(format: WireFormat, line: &str) -> LineEvent {
    match format {
        WireFormat::OllamaNdjson => match serde_json::from_str::<Value>(line) {
            Ok(value) => {
                if value.get("done").and_then(Value::as_bool).unwrap_or(false) {
                    return LineEvent::Done;
                }
                match value
                    .get("message")
                    .and_then(|m| m.get("content"))
                    .and_then(Value::as_str)
                {
                    Some("") | None => LineEvent::Skip,
                    Some(content) => LineEvent::Chunk(content.to_string()),
                }
            }
            Err(e) => LineEvent::Error(format!("bad NDJSON line: {}", e)),
        },
        WireFormat::OpenAiSse => {
            let Some(data) = line.strip_prefix("data:") else {
                // Comments and event lines are legal SSE noise.
                return LineEvent::Skip;
            };
            let data = data.trim();
            if data == "[DONE]" {
                return LineEvent::Done;
            }
            match serde_json::from_str::<Value>(data) {
                Ok(value) => {
                    match value
                        .get("choices")
                        .and_then(|c| c.get(0))
                        .and_then(|c| c.get("delta"))
                        .and_then(|d| d.get("content"))
                        .and_then(Value::as_str)
                    {
                        Some("") | None => LineEvent::Skip,
                        Some(content) => LineEvent::Chunk(content.to_string()),
                    }
                }
                Err(e) => LineEvent::Error(format!("bad SSE data line: {}", e)),
            }
        }
    }
}

struct LineStreamState {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    // Raw bytes, not String: a multibyte character may straddle two network
    // chunks, so decoding happens per complete line only.
    buffer: Vec<u8>,
    format: WireFormat,
    timeout_secs: u64,
    finished: bool,
}

/// Turn a line-oriented HTTP body into a stream of text chunks.
fn line_stream<S>(bytes: S, format: WireFormat, timeout_secs: u64) -> TextStream
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    let state = LineStreamState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        format,
        timeout_secs,
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                match handle_line(&mut state, line.trim()) {
                    Some(item) => return Some((item, state)),
                    None if state.finished => return None,
                    None => continue,
                }
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    let message = if e.is_timeout() {
                        format!("stream timed out after {}s", state.timeout_secs)
                    } else {
                        format!("stream failed: {}", e)
                    };
                    return Some((Err(PipelineError::llm(message)), state));
                }
                None => {
                    // Flush a trailing line without a newline, then stop.
                    state.finished = true;
                    let raw = std::mem::take(&mut state.buffer);
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        return None;
                    }
                    match handle_line(&mut state, &line) {
                        Some(item) => return Some((item, state)),
                        None => return None,
                    }
                }
            }
        }
    }))
}

fn handle_line(
    state: &mut LineStreamState,
    line: &str,
) -> Option<Result<String, PipelineError>> {
    if line.is_empty() {
        return None;
    }
    match parse_stream_line(state.format, line) {
        LineEvent::Chunk(content) => Some(Ok(content)),
        LineEvent::Done => {
            state.finished = true;
            None
        }
        LineEvent::Skip => None,
        LineEvent::Error(message) => {
            state.finished = true;
            Some(Err(PipelineError::llm(message)))
        }
    }
}
