//! Response orchestration graph.
//!
//! An explicit finite-state machine: a plain loop over a [`Stage`] enum,
//! threading one [`PipelineState`] through the stages. Stage outputs are
//! additive to the state; the score threshold inside the scoring stage is
//! the single designed point of content elimination.
//!
//! Routing: with zero available context files the graph jumps straight from
//! routing to generation — selecting from an empty set is wasted work and
//! would force empty-input handling on every downstream stage.
//!
//! Reroute: after generation, an optional assessment may propose additional
//! files; the graph loops back to retrieval only while the reroute budget
//! allows. The loop-back edge is the sole place the counter moves, keeping
//! the loop strictly bounded.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sibyl_common::prompts::PromptStore;
use sibyl_common::{
    CandidateFile, FilteredContent, PipelineConfig, PipelineError, RetrievedContent,
    ScoredContent,
};

use crate::assessor::AnswerAssessor;
use crate::generator::{sort_by_descending_score, AnswerGenerator, ChunkSink};
use crate::history::ConversationHistory;
use crate::llm::ChatModel;
use crate::progress::{check_cancelled, ProgressHost};
use crate::reporter::UsedSourcesReporter;
use crate::retriever::ContentRetrieverFilterScorer;
use crate::selector::RelevantFileSelector;
use crate::store::ProjectIndex;
use crate::overview::render_project_overview;

// Approximate incremental progress per stage. UI feedback only; routing can
// skip stages, so these do not sum to 100 across a run.
const PROGRESS_ROUTE: u8 = 5;
const PROGRESS_SELECT: u8 = 20;
const PROGRESS_RETRIEVE: u8 = 25;
const PROGRESS_FILTER: u8 = 30;
const PROGRESS_SCORE: u8 = 35;
const PROGRESS_GENERATE: u8 = 40;
const PROGRESS_FINALIZE: u8 = 10;

/// The stages of the response graph, in graph order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetermineInitialRoute,
    SelectRelevantFiles,
    RetrieveFileContents,
    FilterRetrievedContents,
    ScoreFilteredContents,
    GenerateAnswer,
    DisplayUsedFiles,
    End,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DetermineInitialRoute => "determine_initial_route",
            Stage::SelectRelevantFiles => "select_relevant_files",
            Stage::RetrieveFileContents => "retrieve_file_contents",
            Stage::FilterRetrievedContents => "filter_retrieved_contents",
            Stage::ScoreFilteredContents => "score_filtered_contents",
            Stage::GenerateAnswer => "generate_answer",
            Stage::DisplayUsedFiles => "display_used_files",
            Stage::End => "end",
        }
    }
}

/// Mutable context for one user question. Created fresh per run, discarded
/// after it completes or is cancelled; never persisted.
pub struct PipelineState {
    pub question: String,
    pub available_files: Vec<String>,
    pub overview: String,
    pub candidates: Vec<CandidateFile>,
    /// Paths already read this run; reroute rounds never re-read them.
    pub retrieved_paths: HashSet<String>,
    pub retrieved: Vec<RetrievedContent>,
    pub filtered: Vec<FilteredContent>,
    pub scored: Vec<ScoredContent>,
    pub answer: String,
    pub reroute_count: u32,
    // Watermarks into the additive collections, so reroute rounds only
    // process entries added since the previous round.
    filter_watermark: usize,
    score_watermark: usize,
}

impl PipelineState {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            available_files: vec![],
            overview: String::new(),
            candidates: vec![],
            retrieved_paths: HashSet::new(),
            retrieved: vec![],
            filtered: vec![],
            scored: vec![],
            answer: String::new(),
            reroute_count: 0,
            filter_watermark: 0,
            score_watermark: 0,
        }
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct PipelineRunReport {
    pub answer: String,
    /// Surviving sources in display order (descending score).
    pub used_sources: Vec<ScoredContent>,
    pub reroutes: u32,
}

/// Wires the stages into the response graph.
///
/// All collaborators are injected; there are no process-wide singletons.
/// Build one at the host's composition root and reuse it across questions.
pub struct ResponseOrchestrator {
    selector: RelevantFileSelector,
    retriever: ContentRetrieverFilterScorer,
    generator: AnswerGenerator,
    assessor: AnswerAssessor,
    index: Arc<dyn ProjectIndex>,
    history: Arc<dyn ConversationHistory>,
    progress: Arc<dyn ProgressHost>,
    config: PipelineConfig,
}

impl ResponseOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        index: Arc<dyn ProjectIndex>,
        history: Arc<dyn ConversationHistory>,
        prompts: Arc<dyn PromptStore>,
        progress: Arc<dyn ProgressHost>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            selector: RelevantFileSelector::new(
                model.clone(),
                prompts.clone(),
                config.clone(),
            ),
            retriever: ContentRetrieverFilterScorer::new(
                model.clone(),
                prompts.clone(),
                index.clone(),
                config.clone(),
            ),
            generator: AnswerGenerator::new(
                model.clone(),
                prompts.clone(),
                history.clone(),
                config.clone(),
            ),
            assessor: AnswerAssessor::new(model, prompts, config.clone()),
            index,
            history,
            progress,
            config,
        }
    }

    /// Run the full graph for one question.
    ///
    /// Fatal errors (selection, generation) propagate unchanged; file-local
    /// errors were already absorbed by their stages. Cancellation surfaces
    /// as [`PipelineError::Cancelled`].
    pub async fn run(
        &self,
        question: &str,
        on_chunk: &ChunkSink,
        token: &CancellationToken,
    ) -> Result<PipelineRunReport, PipelineError> {
        let mut state = PipelineState::new(question);
        let mut stage = Stage::DetermineInitialRoute;

        while stage != Stage::End {
            check_cancelled(token)?;
            debug!(stage = stage.name(), "entering stage");
            stage = match stage {
                Stage::DetermineInitialRoute => self.determine_initial_route(&mut state).await,
                Stage::SelectRelevantFiles => self.select_relevant_files(&mut state).await?,
                Stage::RetrieveFileContents => {
                    self.retrieve_file_contents(&mut state, token).await?
                }
                Stage::FilterRetrievedContents => {
                    self.filter_retrieved_contents(&mut state, token).await?
                }
                Stage::ScoreFilteredContents => {
                    self.score_filtered_contents(&mut state, token).await?
                }
                Stage::GenerateAnswer => self.generate_answer(&mut state, on_chunk, token).await?,
                Stage::DisplayUsedFiles => self.display_used_files(&state, on_chunk),
                Stage::End => Stage::End,
            };
        }

        Ok(PipelineRunReport {
            answer: state.answer,
            used_sources: sort_by_descending_score(&state.scored),
            reroutes: state.reroute_count,
        })
    }

    async fn determine_initial_route(&self, state: &mut PipelineState) -> Stage {
        self.progress.report(PROGRESS_ROUTE, "Routing request");
        state.available_files = self.index.all_filtered_files().await;
        state.overview = render_project_overview(&state.available_files, None);

        if state.available_files.is_empty() {
            info!("no context files available; skipping straight to generation");
            Stage::GenerateAnswer
        } else {
            Stage::SelectRelevantFiles
        }
    }

    async fn select_relevant_files(
        &self,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        self.progress.report(PROGRESS_SELECT, "Selecting relevant files");
        let history = self.history.history().await;
        state.candidates = self
            .selector
            .select(&state.question, &history, &state.overview, &state.available_files)
            .await?;
        Ok(Stage::RetrieveFileContents)
    }

    async fn retrieve_file_contents(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<Stage, PipelineError> {
        self.progress.report(PROGRESS_RETRIEVE, "Retrieving file contents");
        let batch = self
            .retriever
            .retrieve(&state.candidates, &state.retrieved_paths, token)
            .await?;
        // The set is updated only after the batch joined: every path that
        // was attempted this round is marked, readable or not, so reroute
        // rounds never retry it.
        for candidate in &state.candidates {
            state.retrieved_paths.insert(candidate.file_path.clone());
        }
        state.retrieved.extend(batch);
        Ok(Stage::FilterRetrievedContents)
    }

    async fn filter_retrieved_contents(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<Stage, PipelineError> {
        self.progress.report(PROGRESS_FILTER, "Filtering retrieved contents");
        let new_items = &state.retrieved[state.filter_watermark..];
        let batch = self.retriever.filter(&state.question, new_items, token).await?;
        state.filter_watermark = state.retrieved.len();
        state.filtered.extend(batch);
        Ok(Stage::ScoreFilteredContents)
    }

    async fn score_filtered_contents(
        &self,
        state: &mut PipelineState,
        token: &CancellationToken,
    ) -> Result<Stage, PipelineError> {
        self.progress.report(PROGRESS_SCORE, "Scoring filtered contents");
        let new_items = &state.filtered[state.score_watermark..];
        let batch = self.retriever.score(&state.question, new_items, token).await?;
        state.score_watermark = state.filtered.len();
        state.scored.extend(batch);
        Ok(Stage::GenerateAnswer)
    }

    async fn generate_answer(
        &self,
        state: &mut PipelineState,
        on_chunk: &ChunkSink,
        token: &CancellationToken,
    ) -> Result<Stage, PipelineError> {
        self.progress.report(PROGRESS_GENERATE, "Generating answer");
        state.answer = self
            .generator
            .generate(&state.question, &state.overview, &state.scored, on_chunk, token)
            .await?;

        if state.reroute_count >= self.config.max_reroutes {
            return Ok(Stage::DisplayUsedFiles);
        }

        let proposals = self
            .assessor
            .assess(&state.question, &state.answer, &state.scored, &state.available_files)
            .await;
        let proposals: Vec<CandidateFile> = proposals
            .into_iter()
            .filter(|candidate| !state.retrieved_paths.contains(&candidate.file_path))
            .collect();

        if proposals.is_empty() {
            return Ok(Stage::DisplayUsedFiles);
        }

        // Sole mutation site of the reroute counter.
        state.reroute_count += 1;
        info!(
            reroute = state.reroute_count,
            proposed = proposals.len(),
            "assessment proposed additional files; rerouting to retrieval"
        );
        state.candidates.extend(proposals);
        Ok(Stage::RetrieveFileContents)
    }

    fn display_used_files(&self, state: &PipelineState, on_chunk: &ChunkSink) -> Stage {
        self.progress.report(PROGRESS_FINALIZE, "Finalizing");
        let ordered = sort_by_descending_score(&state.scored);
        UsedSourcesReporter::report(&ordered, on_chunk);
        Stage::End
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::DetermineInitialRoute.name(), "determine_initial_route");
        assert_eq!(Stage::End.name(), "end");
    }

    #[test]
    fn fresh_state_is_empty() {
        let state = PipelineState::new("q");
        assert_eq!(state.question, "q");
        assert!(state.candidates.is_empty());
        assert!(state.retrieved_paths.is_empty());
        assert_eq!(state.reroute_count, 0);
    }
}
