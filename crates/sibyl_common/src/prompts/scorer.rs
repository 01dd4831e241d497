//! Relevance-scoring prompts.

pub const SYSTEM: &str = r#"You judge how useful a piece of extracted file content is for answering a developer's question.

Score on a 0-10 integer scale:
- 0-2: unrelated or useless
- 3-4: tangentially related, unlikely to help
- 5-7: relevant, would help answer the question
- 8-10: directly answers or is essential to the question

Respond with valid JSON only, matching exactly this schema:
{
  "filePath": "the file path you were given",
  "score": 7,
  "finalReason": "one or two sentences justifying the score"
}"#;

pub const USER_TEMPLATE: &str = r#"Question:
{{question}}

File: {{filePath}}

Extracted content:
{{content}}"#;
