//! Pipeline configuration.
//!
//! Everything a deployment could plausibly need to tune lives here rather
//! than as constants buried in stage logic: the score threshold, the reroute
//! budget, request timeouts, sampling knobs, and the include/exclude
//! patterns that define which project files are eligible as context.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Minimum relevance score for content to survive into the answer prompt.
pub const DEFAULT_SCORE_THRESHOLD: u8 = 5;

/// Reroute budget. Zero keeps the loop-back mechanism present but disabled.
pub const DEFAULT_MAX_REROUTES: u32 = 0;

/// Per-request timeout for LLM calls. The upstream design had none, which
/// let a hung provider stall the whole pipeline indefinitely.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hard cutoff on the 0-10 relevance scale.
    pub score_threshold: u8,

    /// How many times the assessment stage may loop the graph back to
    /// retrieval with additional files.
    pub max_reroutes: u32,

    /// Applied to every LLM network call.
    pub request_timeout_secs: u64,

    /// Generation knobs forwarded to the chat model.
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,

    /// Files must match this regex to be eligible as context. Required.
    pub include_pattern: String,

    /// Files matching this regex are excluded even when included above.
    pub exclude_pattern: Option<String>,

    /// User-designated files and folders that root the context walk.
    pub context_roots: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_reroutes: DEFAULT_MAX_REROUTES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_tokens: 4096,
            temperature: 0.2,
            top_p: 0.9,
            include_pattern: r"\.(rs|ts|js|py|go|java|md|toml|json|yaml|yml)$".to_string(),
            exclude_pattern: Some(r"(^|/)(target|node_modules|\.git)(/|$)".to_string()),
            context_roots: vec![],
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| PipelineError::config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail later, at runtime.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.include_pattern.is_empty() {
            return Err(PipelineError::config("include_pattern must not be empty"));
        }
        self.include_regex()?;
        self.exclude_regex()?;
        if self.score_threshold > crate::types::MAX_RELEVANCE_SCORE {
            return Err(PipelineError::config(format!(
                "score_threshold {} exceeds the 0-{} scale",
                self.score_threshold,
                crate::types::MAX_RELEVANCE_SCORE
            )));
        }
        Ok(())
    }

    pub fn include_regex(&self) -> Result<Regex, PipelineError> {
        Regex::new(&self.include_pattern)
            .map_err(|e| PipelineError::config(format!("invalid include_pattern: {}", e)))
    }

    pub fn exclude_regex(&self) -> Result<Option<Regex>, PipelineError> {
        match &self.exclude_pattern {
            None => Ok(None),
            Some(pattern) => Regex::new(pattern)
                .map(Some)
                .map_err(|e| PipelineError::config(format!("invalid exclude_pattern: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.score_threshold, 5);
        assert_eq!(config.max_reroutes, 0);
    }

    #[test]
    fn rejects_bad_include_regex() {
        let config = PipelineConfig {
            include_pattern: "([unclosed".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config { .. })));
    }

    #[test]
    fn rejects_threshold_above_scale() {
        let config = PipelineConfig { score_threshold: 11, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "score_threshold = 7").unwrap();
        writeln!(file, "max_reroutes = 2").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.score_threshold, 7);
        assert_eq!(config.max_reroutes, 2);
        // Untouched keys keep their defaults.
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/sibyl.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }
}
