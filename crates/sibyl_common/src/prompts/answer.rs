//! Final answer-generation prompts.
//!
//! The user template synthesizes the question, the project layout, and the
//! surviving scored content into one message. Only the raw question is later
//! committed to the conversation history; the synthesized block exists for a
//! single model call.

pub const SYSTEM: &str = r#"You are a programming assistant embedded in a developer's editor. Answer the developer's question using the retrieved project content when it is provided.

Rules:
- Ground your answer in the retrieved content; cite file paths when you rely on them.
- If the retrieved content does not cover the question, say so and answer from general knowledge.
- Be direct and concrete; prefer code references over prose summaries."#;

pub const USER_TEMPLATE: &str = r#"{{question}}

Project layout:
{{overview}}

{{contextBlock}}"#;

/// Header introducing the retrieved-content section of the prompt.
pub const CONTEXT_BLOCK_HEADER: &str = "Retrieved project content, most relevant first:";
