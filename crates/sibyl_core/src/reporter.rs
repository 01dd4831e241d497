//! Used-sources footer.
//!
//! Pure formatting: given the surviving scored content, emit a
//! human-readable block through the same callback used for answer
//! streaming. No other side effects.

use sibyl_common::ScoredContent;

use crate::generator::ChunkSink;

pub struct UsedSourcesReporter;

impl UsedSourcesReporter {
    /// Append the sources footer to the streamed answer.
    pub fn report(scored: &[ScoredContent], on_chunk: &ChunkSink) {
        on_chunk(&format_used_sources(scored));
    }
}

/// Render the footer. The input is expected in display order (descending
/// score); this function does not reorder.
pub fn format_used_sources(scored: &[ScoredContent]) -> String {
    if scored.is_empty() {
        return "\n\n---\nNo project files were used for this answer.\n".to_string();
    }
    let mut out = String::from("\n\n---\nSources used:\n");
    for (i, item) in scored.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (score {}/10)\n   selected: {}\n   judged: {}\n",
            i + 1,
            item.file_path,
            item.score,
            item.initial_reason,
            item.final_reason
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn scored(path: &str, score: u8) -> ScoredContent {
        ScoredContent {
            file_path: path.to_string(),
            content: String::new(),
            initial_reason: format!("initial {}", path),
            final_reason: format!("final {}", path),
            score,
        }
    }

    #[test]
    fn lists_sources_with_index_score_and_reasons() {
        let footer = format_used_sources(&[scored("a.rs", 8), scored("b.rs", 6)]);
        assert!(footer.contains("1. a.rs (score 8/10)"));
        assert!(footer.contains("selected: initial a.rs"));
        assert!(footer.contains("judged: final a.rs"));
        assert!(footer.contains("2. b.rs (score 6/10)"));
    }

    #[test]
    fn empty_list_gets_fixed_notice() {
        let footer = format_used_sources(&[]);
        assert!(footer.contains("No project files were used"));
    }

    #[test]
    fn report_goes_through_the_chunk_sink() {
        let collected = Arc::new(Mutex::new(String::new()));
        let sink = {
            let collected = collected.clone();
            move |chunk: &str| collected.lock().unwrap().push_str(chunk)
        };
        UsedSourcesReporter::report(&[scored("a.rs", 7)], &sink);
        assert!(collected.lock().unwrap().contains("a.rs"));
    }
}
