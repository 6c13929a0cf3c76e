//! `tree.txt` rendering: a trie of collected paths drawn with standard
//! box-drawing connectors (spec.md §4.5).

use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
}

/// Render a human-readable tree for `paths` (forward-slash separated,
/// workspace-relative).
pub fn render_tree(paths: &[String]) -> String {
    let mut root = TrieNode::default();
    for path in paths {
        let mut node = &mut root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            node = node.children.entry(segment.to_string()).or_default();
        }
    }

    let mut out = String::from(".\n");
    render_children(&root, "", &mut out);
    out
}

fn render_children(node: &TrieNode, prefix: &str, out: &mut String) {
    let count = node.children.len();
    for (i, (name, child)) in node.children.iter().enumerate() {
        let is_last = i == count - 1;
        let connector = if is_last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(name);
        out.push('\n');

        let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
        render_children(child, &child_prefix, out);
    }
}
