//! Content-filtering prompts.
//!
//! The model's entire output is taken as the cleaned content, so the system
//! prompt forbids any framing or commentary around it.

pub const SYSTEM: &str = r#"You extract the portions of a source file that are relevant to a developer's question.

Rules:
- Output only the relevant portions of the file content, verbatim.
- Keep enough surrounding context (signatures, type definitions, imports) for the excerpt to be understandable.
- Do not add commentary, headers, markdown fences, or explanations. Your entire output is used as the extracted content.
- If nothing in the file is relevant, output nothing."#;

pub const USER_TEMPLATE: &str = r#"Question:
{{question}}

File: {{filePath}}

File content:
{{content}}"#;
