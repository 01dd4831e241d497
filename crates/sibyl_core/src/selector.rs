//! Relevant file selection.
//!
//! Asks the model which project files matter for the question, then
//! validates every returned path against the available-files list. The
//! validation is the pipeline's primary defense against hallucinated paths:
//! invalid entries are dropped with a warning, never forwarded.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, warn};

use sibyl_common::prompts::{render_template, PromptId, PromptStore};
use sibyl_common::{CandidateFile, ConversationMessage, PipelineConfig, PipelineError};

use crate::llm::{generate_object, ChatModel, ChatRequest};
use crate::overview::render_file_list;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectedFilesResponse {
    #[serde(default)]
    selected_files: Vec<CandidateFile>,
}

pub struct RelevantFileSelector {
    model: Arc<dyn ChatModel>,
    prompts: Arc<dyn PromptStore>,
    config: PipelineConfig,
}

impl RelevantFileSelector {
    pub fn new(
        model: Arc<dyn ChatModel>,
        prompts: Arc<dyn PromptStore>,
        config: PipelineConfig,
    ) -> Self {
        Self { model, prompts, config }
    }

    /// Propose a ranked list of candidate files for the question.
    ///
    /// Selection failure is fatal to the pipeline run: without it the
    /// downstream stages have nothing to retrieve, so the error is logged
    /// with full context and re-raised rather than silently defaulted.
    pub async fn select(
        &self,
        question: &str,
        history: &[ConversationMessage],
        overview: &str,
        available_files: &[String],
    ) -> Result<Vec<CandidateFile>, PipelineError> {
        let system = self.prompts.template(PromptId::SelectorSystem);
        let user = render_template(
            &self.prompts.template(PromptId::SelectorUser),
            &[
                ("question", question),
                ("history", &render_history(history)),
                ("overview", overview),
                ("availableFiles", &render_file_list(available_files)),
            ],
        );
        let request = ChatRequest::new(
            Some(system),
            vec![ConversationMessage::user(user)],
            &self.config,
        );

        let response: SelectedFilesResponse = generate_object(self.model.as_ref(), request)
            .await
            .map_err(|e| {
                error!(stage = "select", error = %e, question, "file selection call failed");
                PipelineError::selection(e)
            })?;

        let candidates = validate_candidates(response.selected_files, available_files);
        debug!(stage = "select", count = candidates.len(), "selection complete");
        Ok(candidates)
    }
}

/// Keep only candidates whose path exists in the available-files list.
pub(crate) fn validate_candidates(
    candidates: Vec<CandidateFile>,
    available_files: &[String],
) -> Vec<CandidateFile> {
    let known: HashSet<&str> = available_files.iter().map(String::as_str).collect();
    candidates
        .into_iter()
        .filter(|candidate| {
            if known.contains(candidate.file_path.as_str()) {
                true
            } else {
                warn!(
                    file_path = %candidate.file_path,
                    "dropping selected file not present in the project index"
                );
                false
            }
        })
        .collect()
}

fn render_history(history: &[ConversationMessage]) -> String {
    if history.is_empty() {
        return "(no prior conversation)".to_string();
    }
    history
        .iter()
        .map(|message| format!("{}: {}", message.role.as_str(), message.content))
        .collect::<Vec<_>>()
        .join("\n")
}
