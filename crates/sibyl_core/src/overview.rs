//! Project resource overview rendering.
//!
//! Turns the filtered file list into the indented tree block embedded in
//! prompts, optionally annotated with per-file line counts.

use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    is_file: bool,
    full_path: String,
}

/// Render the file list as an indented tree. Directories get a trailing
/// slash; files get a line-count annotation when one is provided.
pub fn render_project_overview(
    paths: &[String],
    line_counts: Option<&HashMap<String, usize>>,
) -> String {
    if paths.is_empty() {
        return "(no context files)".to_string();
    }

    let mut root = TreeNode::default();
    for path in paths {
        let mut node = &mut root;
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (i, component) in components.iter().enumerate() {
            node = node.children.entry(component.to_string()).or_default();
            if i == components.len() - 1 {
                node.is_file = true;
                node.full_path = path.clone();
            }
        }
    }

    let mut out = String::new();
    render_node(&root, 0, line_counts, &mut out);
    out.trim_end().to_string()
}

fn render_node(
    node: &TreeNode,
    depth: usize,
    line_counts: Option<&HashMap<String, usize>>,
    out: &mut String,
) {
    for (name, child) in &node.children {
        let indent = "  ".repeat(depth);
        if child.is_file {
            let annotation = line_counts
                .and_then(|counts| counts.get(&child.full_path))
                .map(|count| format!(" ({} lines)", count))
                .unwrap_or_default();
            out.push_str(&format!("{}{}{}\n", indent, name, annotation));
        } else {
            out.push_str(&format!("{}{}/\n", indent, name));
        }
        render_node(child, depth + 1, line_counts, out);
    }
}

/// Render a flat bullet list of paths, used where prompts need the exact
/// selectable strings rather than a tree.
pub fn render_file_list(paths: &[String]) -> String {
    if paths.is_empty() {
        return "(none)".to_string();
    }
    paths
        .iter()
        .map(|path| format!("- {}", path))
        .collect::<Vec<_>>()
        .join("\n")
}
