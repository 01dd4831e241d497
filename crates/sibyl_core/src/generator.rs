//! Final answer generation.
//!
//! Builds the answer prompt from the question, the project layout, and the
//! surviving scored content (descending score, stable for ties), streams the
//! model's response through the caller's callback, and commits to history
//! only on success — and only the raw question, never the synthesized
//! context block.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use sibyl_common::prompts::{answer, render_template, PromptId, PromptStore};
use sibyl_common::{
    ConversationMessage, PipelineConfig, PipelineError, Role, ScoredContent,
};

use crate::history::ConversationHistory;
use crate::llm::{ChatModel, ChatRequest};
use crate::progress::check_cancelled;

/// Callback receiving answer chunks as they stream in.
pub type ChunkSink = dyn Fn(&str) + Send + Sync;

pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    prompts: Arc<dyn PromptStore>,
    history: Arc<dyn ConversationHistory>,
    config: PipelineConfig,
}

impl AnswerGenerator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        prompts: Arc<dyn PromptStore>,
        history: Arc<dyn ConversationHistory>,
        config: PipelineConfig,
    ) -> Self {
        Self { model, prompts, history, config }
    }

    /// Stream the answer, returning the accumulated text.
    ///
    /// On cancellation the partial text is discarded and nothing reaches the
    /// history; on stream failure likewise. Both the raw question and the
    /// final answer are committed only after the stream completes.
    pub async fn generate(
        &self,
        question: &str,
        overview: &str,
        scored: &[ScoredContent],
        on_chunk: &ChunkSink,
        token: &CancellationToken,
    ) -> Result<String, PipelineError> {
        check_cancelled(token)?;

        let ordered = sort_by_descending_score(scored);
        let context_block = build_context_block(&ordered);
        let user_prompt = render_template(
            &self.prompts.template(PromptId::AnswerUser),
            &[
                ("question", question),
                ("overview", overview),
                ("contextBlock", &context_block),
            ],
        );

        // A copy of the canonical history; it is not touched until success.
        let mut messages = self.history.history().await;
        messages.push(ConversationMessage::user(user_prompt));
        let request = ChatRequest::new(
            Some(self.prompts.template(PromptId::AnswerSystem)),
            messages,
            &self.config,
        );

        let mut stream = self.model.stream_text(request).await.map_err(|e| {
            error!(stage = "generate", error = %e, "failed to start answer stream");
            as_generation_error(e)
        })?;

        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            check_cancelled(token)?;
            let chunk = chunk.map_err(|e| {
                error!(stage = "generate", error = %e, "answer stream failed mid-flight");
                as_generation_error(e)
            })?;
            on_chunk(&chunk);
            answer.push_str(&chunk);
        }

        debug!(stage = "generate", chars = answer.len(), "answer stream complete");
        self.history.add_message(Role::User, question.to_string()).await;
        self.history.add_message(Role::Assistant, answer.clone()).await;
        Ok(answer)
    }
}

fn as_generation_error(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::generation(other),
    }
}

/// Stable descending-score ordering; ties keep original retrieval order.
pub(crate) fn sort_by_descending_score(scored: &[ScoredContent]) -> Vec<ScoredContent> {
    let mut ordered = scored.to_vec();
    ordered.sort_by(|a, b| b.score.cmp(&a.score));
    ordered
}

fn build_context_block(ordered: &[ScoredContent]) -> String {
    if ordered.is_empty() {
        return String::new();
    }
    let mut block = String::from(answer::CONTEXT_BLOCK_HEADER);
    block.push('\n');
    for item in ordered {
        block.push_str(&format!(
            "\n--- {} (score {}/10) ---\n{}\n",
            item.file_path, item.score, item.content
        ));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use crate::llm::FakeChatModel;
    use sibyl_common::prompts::DefaultPromptStore;

    fn scored(path: &str, score: u8) -> ScoredContent {
        ScoredContent {
            file_path: path.to_string(),
            content: format!("content of {}", path),
            initial_reason: "r".to_string(),
            final_reason: "fr".to_string(),
            score,
        }
    }

    fn generator(
        fake: Arc<FakeChatModel>,
        history: Arc<InMemoryHistory>,
    ) -> AnswerGenerator {
        AnswerGenerator::new(
            fake,
            Arc::new(DefaultPromptStore),
            history,
            PipelineConfig::default(),
        )
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let items = vec![scored("a.rs", 5), scored("b.rs", 9), scored("c.rs", 5)];
        let ordered = sort_by_descending_score(&items);
        let paths: Vec<&str> = ordered.iter().map(|s| s.file_path.as_str()).collect();
        assert_eq!(paths, vec!["b.rs", "a.rs", "c.rs"]);
    }

    #[test]
    fn context_block_is_empty_without_sources() {
        assert_eq!(build_context_block(&[]), "");
        let block = build_context_block(&[scored("a.rs", 8)]);
        assert!(block.contains("a.rs (score 8/10)"));
        assert!(block.contains("content of a.rs"));
    }

    #[tokio::test]
    async fn streams_chunks_and_commits_raw_question() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_stream(vec!["Hello ", "world"]);
        let history = Arc::new(InMemoryHistory::new());
        let generator = generator(fake.clone(), history.clone());

        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = {
            let seen = seen.clone();
            move |chunk: &str| seen.lock().unwrap().push_str(chunk)
        };

        let answer = generator
            .generate(
                "What is X?",
                "(no context files)",
                &[scored("a.rs", 8)],
                &sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(answer, "Hello world");
        assert_eq!(*seen.lock().unwrap(), "Hello world");

        // History holds the raw question, not the synthesized prompt.
        let messages = history.history().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "What is X?");
        assert_eq!(messages[1].content, "Hello world");

        // The model, by contrast, saw the injected content.
        let request = &fake.recorded_requests()[0];
        let prompt = &request.messages.last().unwrap().content;
        assert!(prompt.contains("content of a.rs"));
    }

    #[tokio::test]
    async fn stream_failure_commits_nothing() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_stream_failing_after(vec!["partial "], "connection reset");
        let history = Arc::new(InMemoryHistory::new());
        let generator = generator(fake, history.clone());

        let err = generator
            .generate("q", "", &[], &|_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation { .. }));
        assert!(history.history().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_discards_partial_answer() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_stream(vec!["chunk1", "chunk2", "chunk3"]);
        let history = Arc::new(InMemoryHistory::new());
        let generator = generator(fake, history.clone());

        let token = CancellationToken::new();
        let cancel_after_first = {
            let token = token.clone();
            move |_: &str| token.cancel()
        };

        let err = generator
            .generate("q", "", &[], &cancel_after_first, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(history.history().await.is_empty());
    }
}
