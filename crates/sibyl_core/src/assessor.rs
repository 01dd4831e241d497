//! Post-hoc answer assessment.
//!
//! After generation, optionally asks the model whether additional files
//! would materially improve the answer. The assessment is advisory: any
//! failure degrades to "no proposals" so it can never sink a run that
//! already produced an answer. Proposed paths go through the same
//! validation as selector output, and files already used are dropped.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use sibyl_common::prompts::{render_template, PromptId, PromptStore};
use sibyl_common::{CandidateFile, ConversationMessage, PipelineConfig, ScoredContent};

use crate::llm::{generate_object, ChatModel, ChatRequest};
use crate::overview::render_file_list;
use crate::selector::validate_candidates;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentResponse {
    #[serde(default)]
    needs_more: bool,
    #[serde(default)]
    additional_files: Vec<CandidateFile>,
}

pub struct AnswerAssessor {
    model: Arc<dyn ChatModel>,
    prompts: Arc<dyn PromptStore>,
    config: PipelineConfig,
}

impl AnswerAssessor {
    pub fn new(
        model: Arc<dyn ChatModel>,
        prompts: Arc<dyn PromptStore>,
        config: PipelineConfig,
    ) -> Self {
        Self { model, prompts, config }
    }

    /// Additional candidate files the answer still needs, possibly none.
    pub async fn assess(
        &self,
        question: &str,
        answer: &str,
        used: &[ScoredContent],
        available_files: &[String],
    ) -> Vec<CandidateFile> {
        let used_paths: Vec<String> = used.iter().map(|s| s.file_path.clone()).collect();
        let system = self.prompts.template(PromptId::AssessorSystem);
        let user = render_template(
            &self.prompts.template(PromptId::AssessorUser),
            &[
                ("question", question),
                ("answer", answer),
                ("usedFiles", &render_file_list(&used_paths)),
                ("availableFiles", &render_file_list(available_files)),
            ],
        );
        let request = ChatRequest::new(
            Some(system),
            vec![ConversationMessage::user(user)],
            &self.config,
        );

        let response: AssessmentResponse =
            match generate_object(self.model.as_ref(), request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(stage = "assess", error = %e, "assessment failed; skipping reroute");
                    return vec![];
                }
            };

        if !response.needs_more {
            debug!(stage = "assess", "answer judged complete");
            return vec![];
        }

        let already_used: HashSet<&str> = used_paths.iter().map(String::as_str).collect();
        validate_candidates(response.additional_files, available_files)
            .into_iter()
            .filter(|candidate| !already_used.contains(candidate.file_path.as_str()))
            .collect()
    }
}
