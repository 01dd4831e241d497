//! Post-hoc assessment prompts.
//!
//! After an answer is generated, the assessor may decide it is incomplete
//! and propose additional files; the orchestrator loops back to retrieval
//! only while the reroute budget allows.

pub const SYSTEM: &str = r#"You review a generated answer and decide whether more project files would materially improve it.

Rules:
- Only propose file paths that appear verbatim in the provided list of available files.
- Never propose files that were already used.
- Propose files only when the answer is clearly missing information those files would supply.
- When the answer is adequate, set needsMore to false and propose nothing.

Respond with valid JSON only, matching exactly this schema:
{
  "needsMore": false,
  "additionalFiles": [
    {
      "filePath": "path/from/the/available/list",
      "initialReason": "what the answer is missing that this file supplies"
    }
  ]
}"#;

pub const USER_TEMPLATE: &str = r#"Question:
{{question}}

Generated answer:
{{answer}}

Files already used:
{{usedFiles}}

Available files (propose only from these):
{{availableFiles}}"#;
