//! Prompt templates for every LLM-facing stage.
//!
//! Templates use `{{placeholder}}` substitution. Each stage has a fixed
//! system prompt (persona and instructions) and a user template with
//! placeholders for the question, overview, history, and content. Hosts can
//! override any of them by supplying their own [`PromptStore`].

pub mod answer;
pub mod assessor;
pub mod filter;
pub mod scorer;
pub mod selector;

/// Identifiers for every prompt the pipeline requests from its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    SelectorSystem,
    SelectorUser,
    FilterSystem,
    FilterUser,
    ScorerSystem,
    ScorerUser,
    AnswerSystem,
    AnswerUser,
    AssessorSystem,
    AssessorUser,
}

/// Source of prompt templates, keyed by the fixed [`PromptId`] enumeration.
pub trait PromptStore: Send + Sync {
    fn template(&self, id: PromptId) -> String;
}

/// The built-in prompts.
#[derive(Debug, Default, Clone)]
pub struct DefaultPromptStore;

impl PromptStore for DefaultPromptStore {
    fn template(&self, id: PromptId) -> String {
        let template = match id {
            PromptId::SelectorSystem => selector::SYSTEM,
            PromptId::SelectorUser => selector::USER_TEMPLATE,
            PromptId::FilterSystem => filter::SYSTEM,
            PromptId::FilterUser => filter::USER_TEMPLATE,
            PromptId::ScorerSystem => scorer::SYSTEM,
            PromptId::ScorerUser => scorer::USER_TEMPLATE,
            PromptId::AnswerSystem => answer::SYSTEM,
            PromptId::AnswerUser => answer::USER_TEMPLATE,
            PromptId::AssessorSystem => assessor::SYSTEM,
            PromptId::AssessorUser => assessor::USER_TEMPLATE,
        };
        template.to_string()
    }
}

/// Substitute `{{name}}` placeholders with the given values.
///
/// Unknown placeholders are left in place so callers can detect them with
/// [`leftover_placeholders`]; substitution never fails.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (name, value) in values {
        let placeholder = format!("{{{{{}}}}}", name);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

/// Placeholder names still present after rendering.
pub fn leftover_placeholders(rendered: &str) -> Vec<String> {
    let re = regex::Regex::new(r"\{\{(\w+)\}\}").expect("placeholder regex is valid");
    re.captures_iter(rendered).map(|c| c[1].to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders() {
        let rendered = render_template(
            "Q: {{question}}\nFiles:\n{{overview}}",
            &[("question", "what is X?"), ("overview", "- a.rs\n- b.rs")],
        );
        assert_eq!(rendered, "Q: what is X?\nFiles:\n- a.rs\n- b.rs");
        assert!(leftover_placeholders(&rendered).is_empty());
    }

    #[test]
    fn leaves_unknown_placeholders_detectable() {
        let rendered = render_template("{{question}} {{missing}}", &[("question", "q")]);
        assert_eq!(leftover_placeholders(&rendered), vec!["missing"]);
    }

    #[test]
    fn default_store_covers_every_id() {
        let store = DefaultPromptStore;
        for id in [
            PromptId::SelectorSystem,
            PromptId::SelectorUser,
            PromptId::FilterSystem,
            PromptId::FilterUser,
            PromptId::ScorerSystem,
            PromptId::ScorerUser,
            PromptId::AnswerSystem,
            PromptId::AnswerUser,
            PromptId::AssessorSystem,
            PromptId::AssessorUser,
        ] {
            assert!(!store.template(id).is_empty(), "empty template for {:?}", id);
        }
    }

    #[test]
    fn user_templates_declare_their_placeholders() {
        let store = DefaultPromptStore;
        let selector = store.template(PromptId::SelectorUser);
        for name in ["question", "overview", "history", "availableFiles"] {
            assert!(selector.contains(&format!("{{{{{}}}}}", name)), "selector misses {}", name);
        }
        let filter = store.template(PromptId::FilterUser);
        for name in ["question", "filePath", "content"] {
            assert!(filter.contains(&format!("{{{{{}}}}}", name)), "filter misses {}", name);
        }
        let scorer = store.template(PromptId::ScorerUser);
        for name in ["question", "filePath", "content"] {
            assert!(scorer.contains(&format!("{{{{{}}}}}", name)), "scorer misses {}", name);
        }
    }
}
