//! Content retrieval, filtering, and scoring.
//!
//! Three sequential sub-stages, each an internal fan-out of independent
//! per-file tasks joined before the stage completes. Merges preserve the
//! input ordering regardless of completion order.
//!
//! Failure semantics differ per sub-stage but are always file-local:
//! - retrieve: unreadable file is logged and omitted;
//! - filter: a failed file degrades to empty content, the batch continues;
//! - score: a failed file is excluded, the batch continues.
//! Only cancellation crosses the batch boundary.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sibyl_common::prompts::{render_template, PromptId, PromptStore};
use sibyl_common::types::clamp_score;
use sibyl_common::{
    CandidateFile, ConversationMessage, FilteredContent, PipelineConfig, PipelineError,
    RetrievedContent, ScoredContent,
};

use crate::llm::{generate_object, ChatModel, ChatRequest};
use crate::progress::check_cancelled;
use crate::store::ProjectIndex;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScoreResponse {
    #[serde(default)]
    file_path: Option<String>,
    score: f64,
    #[serde(default)]
    final_reason: String,
}

pub struct ContentRetrieverFilterScorer {
    model: Arc<dyn ChatModel>,
    prompts: Arc<dyn PromptStore>,
    index: Arc<dyn ProjectIndex>,
    config: PipelineConfig,
}

impl ContentRetrieverFilterScorer {
    pub fn new(
        model: Arc<dyn ChatModel>,
        prompts: Arc<dyn PromptStore>,
        index: Arc<dyn ProjectIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self { model, prompts, index, config }
    }

    /// Read content for every candidate not already retrieved this run.
    ///
    /// Reads are independent and run concurrently; the caller updates the
    /// retrieved-path set only after the whole batch has joined, so no task
    /// observes a half-updated set.
    pub async fn retrieve(
        &self,
        candidates: &[CandidateFile],
        already_retrieved: &HashSet<String>,
        token: &CancellationToken,
    ) -> Result<Vec<RetrievedContent>, PipelineError> {
        check_cancelled(token)?;
        let pending: Vec<&CandidateFile> = candidates
            .iter()
            .filter(|candidate| !already_retrieved.contains(&candidate.file_path))
            .collect();

        let reads = pending.iter().map(|candidate| async move {
            match self.index.read_file_content(&candidate.file_path).await {
                Ok(content) => Some(RetrievedContent {
                    file_path: candidate.file_path.clone(),
                    content,
                    initial_reason: candidate.initial_reason.clone(),
                }),
                Err(e) => {
                    warn!(
                        stage = "retrieve",
                        file_path = %candidate.file_path,
                        error = %e,
                        "skipping unreadable file"
                    );
                    None
                }
            }
        });

        let retrieved: Vec<RetrievedContent> =
            join_all(reads).await.into_iter().flatten().collect();
        debug!(
            stage = "retrieve",
            requested = pending.len(),
            retrieved = retrieved.len(),
            "retrieval batch complete"
        );
        Ok(retrieved)
    }

    /// Ask the model to strip irrelevant portions from each file's content.
    ///
    /// Output is one entry per input, in input order. A per-file failure
    /// yields the empty string for that file only.
    pub async fn filter(
        &self,
        question: &str,
        retrieved: &[RetrievedContent],
        token: &CancellationToken,
    ) -> Result<Vec<FilteredContent>, PipelineError> {
        check_cancelled(token)?;
        let tasks = retrieved.iter().map(|item| self.filter_one(question, item, token));
        let results = join_all(tasks).await;

        let mut filtered = Vec::with_capacity(results.len());
        for result in results {
            filtered.push(result?);
        }
        Ok(filtered)
    }

    async fn filter_one(
        &self,
        question: &str,
        item: &RetrievedContent,
        token: &CancellationToken,
    ) -> Result<FilteredContent, PipelineError> {
        let content = match self.stream_filtered_content(question, item, token).await {
            Ok(content) => content,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(
                    stage = "filter",
                    file_path = %item.file_path,
                    error = %e,
                    "filtering failed; degrading to empty content"
                );
                String::new()
            }
        };
        Ok(FilteredContent {
            file_path: item.file_path.clone(),
            content,
            initial_reason: item.initial_reason.clone(),
        })
    }

    async fn stream_filtered_content(
        &self,
        question: &str,
        item: &RetrievedContent,
        token: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let system = self.prompts.template(PromptId::FilterSystem);
        let user = render_template(
            &self.prompts.template(PromptId::FilterUser),
            &[
                ("question", question),
                ("filePath", &item.file_path),
                ("content", &item.content),
            ],
        );
        let request = ChatRequest::new(
            Some(system),
            vec![ConversationMessage::user(user)],
            &self.config,
        );

        let mut stream = self.model.stream_text(request).await?;
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            check_cancelled(token)?;
            output.push_str(&chunk?);
        }
        Ok(output)
    }

    /// Score each non-empty filtered content and apply the hard threshold.
    ///
    /// Entries below `score_threshold` are excluded entirely; a per-file
    /// scoring failure excludes that file and the batch continues.
    pub async fn score(
        &self,
        question: &str,
        filtered: &[FilteredContent],
        token: &CancellationToken,
    ) -> Result<Vec<ScoredContent>, PipelineError> {
        check_cancelled(token)?;
        let tasks = filtered
            .iter()
            .filter(|item| !item.is_empty())
            .map(|item| self.score_one(question, item, token));
        let results = join_all(tasks).await;

        let mut scored = Vec::new();
        for result in results {
            if let Some(item) = result? {
                scored.push(item);
            }
        }
        Ok(scored)
    }

    async fn score_one(
        &self,
        question: &str,
        item: &FilteredContent,
        token: &CancellationToken,
    ) -> Result<Option<ScoredContent>, PipelineError> {
        check_cancelled(token)?;
        let system = self.prompts.template(PromptId::ScorerSystem);
        let user = render_template(
            &self.prompts.template(PromptId::ScorerUser),
            &[
                ("question", question),
                ("filePath", &item.file_path),
                ("content", &item.content),
            ],
        );
        let request = ChatRequest::new(
            Some(system),
            vec![ConversationMessage::user(user)],
            &self.config,
        );

        let response: ScoreResponse = match generate_object(self.model.as_ref(), request).await {
            Ok(response) => response,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(
                    stage = "score",
                    file_path = %item.file_path,
                    error = %e,
                    "scoring failed; excluding file"
                );
                return Ok(None);
            }
        };

        if let Some(reported) = &response.file_path {
            if reported != &item.file_path {
                debug!(
                    stage = "score",
                    expected = %item.file_path,
                    reported = %reported,
                    "model reported a different path; keeping the original"
                );
            }
        }

        let score = clamp_score(response.score);
        if score < self.config.score_threshold {
            debug!(
                stage = "score",
                file_path = %item.file_path,
                score,
                threshold = self.config.score_threshold,
                "below threshold; excluding"
            );
            return Ok(None);
        }

        Ok(Some(ScoredContent {
            file_path: item.file_path.clone(),
            content: item.content.clone(),
            initial_reason: item.initial_reason.clone(),
            final_reason: response.final_reason,
            score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeChatModel;
    use crate::store::InMemoryProjectIndex;
    use sibyl_common::prompts::DefaultPromptStore;
    use std::collections::HashMap;

    fn candidate(path: &str) -> CandidateFile {
        CandidateFile {
            file_path: path.to_string(),
            initial_reason: format!("reason for {}", path),
            symbols: None,
        }
    }

    fn retrieved(path: &str, content: &str) -> RetrievedContent {
        RetrievedContent {
            file_path: path.to_string(),
            content: content.to_string(),
            initial_reason: "r".to_string(),
        }
    }

    fn filtered(path: &str, content: &str) -> FilteredContent {
        FilteredContent {
            file_path: path.to_string(),
            content: content.to_string(),
            initial_reason: "r".to_string(),
        }
    }

    fn stage(
        fake: Arc<FakeChatModel>,
        index: Arc<dyn ProjectIndex>,
    ) -> ContentRetrieverFilterScorer {
        ContentRetrieverFilterScorer::new(
            fake,
            Arc::new(DefaultPromptStore),
            index,
            PipelineConfig::default(),
        )
    }

    fn index_with(files: &[(&str, &str)]) -> Arc<dyn ProjectIndex> {
        let map: HashMap<String, String> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        Arc::new(InMemoryProjectIndex::new(map))
    }

    #[tokio::test]
    async fn retrieve_skips_already_retrieved_paths() {
        let fake = Arc::new(FakeChatModel::new());
        let index = index_with(&[("a.rs", "fn a() {}"), ("b.rs", "fn b() {}")]);
        let stage = stage(fake, index);

        let mut already = HashSet::new();
        already.insert("a.rs".to_string());

        let batch = stage
            .retrieve(
                &[candidate("a.rs"), candidate("b.rs")],
                &already,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].file_path, "b.rs");
    }

    #[tokio::test]
    async fn retrieve_omits_unreadable_files() {
        let fake = Arc::new(FakeChatModel::new());
        let index = index_with(&[("a.rs", "fn a() {}")]);
        let stage = stage(fake, index);

        let batch = stage
            .retrieve(
                &[candidate("a.rs"), candidate("missing.rs")],
                &HashSet::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].file_path, "a.rs");
        assert_eq!(batch[0].initial_reason, "reason for a.rs");
    }

    #[tokio::test]
    async fn retrieve_preserves_candidate_order() {
        let fake = Arc::new(FakeChatModel::new());
        let index = index_with(&[("a.rs", "a"), ("b.rs", "b"), ("c.rs", "c")]);
        let stage = stage(fake, index);

        let batch = stage
            .retrieve(
                &[candidate("c.rs"), candidate("a.rs"), candidate("b.rs")],
                &HashSet::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let order: Vec<&str> = batch.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(order, vec!["c.rs", "a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn filter_failure_degrades_single_file_to_empty() {
        let fake = Arc::new(FakeChatModel::new());
        // One scripted response per file, in order: A ok, B fails, C ok.
        fake.push_stream(vec!["kept a"]);
        fake.push_stream_error("provider exploded");
        fake.push_stream(vec!["kept c"]);

        let stage = stage(fake, index_with(&[]));
        let batch = stage
            .filter(
                "q",
                &[retrieved("a.rs", "A"), retrieved("b.rs", "B"), retrieved("c.rs", "C")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].content, "kept a");
        assert_eq!(batch[1].content, "");
        assert_eq!(batch[2].content, "kept c");
    }

    #[tokio::test]
    async fn filter_cancellation_propagates() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_stream(vec!["chunk1", "chunk2"]);
        let stage = stage(fake, index_with(&[]));

        let token = CancellationToken::new();
        token.cancel();
        let err = stage
            .filter("q", &[retrieved("a.rs", "A")], &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn score_applies_hard_threshold() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_json(serde_json::json!({"filePath": "a.rs", "score": 8, "finalReason": "good"}));
        fake.push_json(serde_json::json!({"filePath": "b.rs", "score": 3, "finalReason": "weak"}));

        let stage = stage(fake, index_with(&[]));
        let scored = stage
            .score(
                "q",
                &[filtered("a.rs", "A"), filtered("b.rs", "B")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].file_path, "a.rs");
        assert_eq!(scored[0].score, 8);
        assert_eq!(scored[0].final_reason, "good");
    }

    #[tokio::test]
    async fn score_skips_empty_filtered_content() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_json(serde_json::json!({"filePath": "a.rs", "score": 9, "finalReason": "r"}));

        let stage = stage(fake.clone(), index_with(&[]));
        let scored = stage
            .score(
                "q",
                &[filtered("empty.rs", "  "), filtered("a.rs", "A")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(scored.len(), 1);
        // Only one model call: the empty entry never reaches the scorer.
        assert_eq!(fake.call_count(), 1);
    }

    #[tokio::test]
    async fn score_failure_excludes_only_that_file() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_json(serde_json::json!({"filePath": "a.rs", "score": 7, "finalReason": "r"}));
        fake.push_json_error("scoring backend down");
        fake.push_json(serde_json::json!({"filePath": "c.rs", "score": 6, "finalReason": "r"}));

        let stage = stage(fake, index_with(&[]));
        let scored = stage
            .score(
                "q",
                &[filtered("a.rs", "A"), filtered("b.rs", "B"), filtered("c.rs", "C")],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let paths: Vec<&str> = scored.iter().map(|s| s.file_path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "c.rs"]);
    }

    #[tokio::test]
    async fn score_clamps_out_of_range_values() {
        let fake = Arc::new(FakeChatModel::new());
        fake.push_json(serde_json::json!({"filePath": "a.rs", "score": 14.7, "finalReason": "r"}));

        let stage = stage(fake, index_with(&[]));
        let scored = stage
            .score("q", &[filtered("a.rs", "A")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scored[0].score, 10);
    }
}
